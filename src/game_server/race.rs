//! Race - Race configuration and session state
//!
//! Handles race setup, countdown, the per-tick ordering of player, bots and
//! progress tracking, and finish detection.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game_server::error::RaceError;
use crate::game_server::navigator::{heading_towards, AiNavigator, NavigatorTuning, PathChoice};
use crate::game_server::progress::{HudInfo, ProgressEvent, RaceProgressTracker, RacerHandle};
use crate::game_server::track::{TrackDefinition, TrackParams};
use crate::game_server::vehicle::{
    ControlIntent, Vehicle, VehicleState, VehicleStatus, VehicleTuning,
};

/// Race configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Laps needed to finish
    pub total_laps: u32,
    /// Number of AI racers
    pub bot_count: u32,
    /// How many of the bots take the shortcut path
    pub shortcut_bot_count: u32,
    /// Planar distance at which a checkpoint counts as passed
    pub checkpoint_radius: f32,
    /// Countdown before the start (seconds)
    pub countdown_seconds: f32,
    /// Distance between grid rows
    pub grid_spacing: f32,
    /// Seed for path assignment
    pub seed: u64,
    pub track: TrackParams,
    pub vehicle: VehicleTuning,
    pub navigator: NavigatorTuning,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            total_laps: 3,
            bot_count: 4,
            shortcut_bot_count: 1,
            checkpoint_radius: 3.5,
            countdown_seconds: 3.0,
            grid_spacing: 2.0,
            seed: 42,
            track: TrackParams::default(),
            vehicle: VehicleTuning::default(),
            navigator: NavigatorTuning::default(),
        }
    }
}

impl RaceConfig {
    /// Parse a (possibly partial) JSON config and validate it
    pub fn from_json(json: &str) -> Result<Self, RaceError> {
        let config: RaceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RaceError> {
        if self.total_laps == 0 {
            return Err(RaceError::InvalidConfig("race needs at least one lap".into()));
        }
        if self.shortcut_bot_count > self.bot_count {
            return Err(RaceError::InvalidConfig(format!(
                "{} shortcut bots requested but only {} bots",
                self.shortcut_bot_count, self.bot_count
            )));
        }
        if self.checkpoint_radius.is_nan() || self.checkpoint_radius <= 0.0 {
            return Err(RaceError::InvalidConfig(
                "checkpoint radius must be positive".into(),
            ));
        }
        if self.countdown_seconds.is_nan() || self.countdown_seconds < 0.0 {
            return Err(RaceError::InvalidConfig(
                "countdown cannot be negative".into(),
            ));
        }
        if !self.grid_spacing.is_finite() || self.grid_spacing < 0.0 {
            return Err(RaceError::InvalidConfig(
                "grid spacing must be finite and non-negative".into(),
            ));
        }
        self.track.validate()?;
        self.vehicle.validate()?;
        self.navigator.validate()
    }
}

/// Race status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    NotStarted,
    Countdown,
    Racing,
    Finished,
}

/// Final standing of one racer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub racer_id: usize,
    pub racer_name: String,
    /// `None` for racers still out on track
    pub finish_time: Option<f32>,
    pub position: u32,
}

/// Complete race session. Racer 0 is the player, the rest are bots.
#[derive(Debug, Clone)]
pub struct Race {
    config: RaceConfig,
    status: RaceStatus,
    track: TrackDefinition,
    /// Indexed by racer id; also the tracker's position source
    vehicles: Vec<VehicleState>,
    /// One per bot, `navigators[i]` drives `vehicles[i + 1]`
    navigators: Vec<AiNavigator>,
    handles: Vec<RacerHandle>,
    tracker: RaceProgressTracker,
    countdown: f32,
    finish_order: Vec<RaceResult>,
}

impl Race {
    pub const PLAYER_ID: usize = 0;

    /// Generate the track, place the grid and register every racer
    pub fn new(config: RaceConfig) -> Result<Self, RaceError> {
        config.validate()?;

        let track = TrackDefinition::generate(&config.track);
        if track.checkpoints.len() < 3 {
            return Err(RaceError::InvalidConfig(format!(
                "track produced {} checkpoints, need at least 3",
                track.checkpoints.len()
            )));
        }

        let start = track.waypoints_main[0];
        let heading = heading_towards(track.waypoints_main[1] - start);
        let player = VehicleState::new(start, heading);
        let forward = player.forward();
        let right = player.right();

        let mut vehicles = vec![player];
        for i in 0..config.bot_count as usize {
            let row = (i / 2 + 1) as f32;
            let side = if i % 2 == 0 { -1.2 } else { 1.2 };
            let position = start - forward * (config.grid_spacing * row) + right * side;
            vehicles.push(VehicleState::new(position, heading));
        }

        let mut choices: Vec<PathChoice> = (0..config.bot_count)
            .map(|i| {
                if i < config.shortcut_bot_count {
                    PathChoice::Shortcut
                } else {
                    PathChoice::Main
                }
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(config.seed);
        choices.shuffle(&mut rng);
        let navigators: Vec<AiNavigator> = choices.into_iter().map(AiNavigator::new).collect();

        let mut tracker = RaceProgressTracker::new(
            track.checkpoints.clone(),
            config.total_laps,
            config.checkpoint_radius,
        );
        let mut handles = vec![tracker.register_racer(Self::PLAYER_ID, "Player")];
        for i in 0..config.bot_count as usize {
            handles.push(tracker.register_racer(i + 1, format!("Bot {}", i + 1)));
        }

        log::info!(
            "Race set up: {} laps, {} bots ({} on the shortcut), {} checkpoints",
            config.total_laps,
            config.bot_count,
            config.shortcut_bot_count,
            track.checkpoints.len()
        );

        Ok(Self {
            countdown: config.countdown_seconds,
            config,
            status: RaceStatus::NotStarted,
            track,
            vehicles,
            navigators,
            handles,
            tracker,
            finish_order: Vec::new(),
        })
    }

    /// Start countdown
    pub fn start_countdown(&mut self) {
        self.status = RaceStatus::Countdown;
        self.countdown = self.config.countdown_seconds;
    }

    /// Advance the race by one tick with the player's input for it
    pub fn update(&mut self, delta: f32, player_input: &ControlIntent) {
        match self.status {
            RaceStatus::NotStarted => {}

            RaceStatus::Countdown => {
                self.countdown -= delta;
                if self.countdown <= 0.0 {
                    self.status = RaceStatus::Racing;
                    self.countdown = 0.0;
                    log::info!("Race started");
                }
            }

            RaceStatus::Racing => {
                let player_finished = self.is_finished(Self::PLAYER_ID);
                let input = if player_finished {
                    ControlIntent::default()
                } else {
                    *player_input
                };
                self.drive(delta, &input);

                // Every racer has moved before progress is read
                let events = self.tracker.update(delta, &self.vehicles);
                self.record_finishes(&events);

                if self.is_finished(Self::PLAYER_ID) || self.tracker.all_finished() {
                    self.status = RaceStatus::Finished;
                    log::info!(
                        "Race finished after {:.2}s, {} racers home",
                        self.tracker.elapsed_seconds(),
                        self.finish_order.len()
                    );
                }
            }

            RaceStatus::Finished => {
                // Cooldown: the player coasts, bots keep lapping
                self.drive(delta, &ControlIntent::default());
            }
        }
    }

    fn drive(&mut self, delta: f32, player_input: &ControlIntent) {
        Vehicle::update(
            &mut self.vehicles[Self::PLAYER_ID],
            player_input,
            &self.config.vehicle,
            delta,
        );

        let nav = self.track.navigation();
        for (navigator, vehicle) in self
            .navigators
            .iter_mut()
            .zip(self.vehicles.iter_mut().skip(1))
        {
            let path = navigator.path(&nav);
            if let Some(intent) = navigator.steer(
                vehicle,
                path,
                &self.config.vehicle,
                &self.config.navigator,
                delta,
            ) {
                Vehicle::update(vehicle, &intent, &self.config.vehicle, delta);
            }
        }
    }

    fn record_finishes(&mut self, events: &[ProgressEvent]) {
        for event in events {
            if let ProgressEvent::Finished { racer, time } = event {
                let racer_id = racer.0;
                if self.finish_order.iter().any(|r| r.racer_id == racer_id) {
                    continue;
                }
                let name = self
                    .tracker
                    .racer(*racer)
                    .map(|r| r.name.clone())
                    .unwrap_or_default();
                self.finish_order.push(RaceResult {
                    racer_id,
                    racer_name: name,
                    finish_time: Some(*time),
                    position: (self.finish_order.len() + 1) as u32,
                });
            }
        }
    }

    fn is_finished(&self, racer_id: usize) -> bool {
        self.handles
            .get(racer_id)
            .and_then(|h| self.tracker.racer(*h))
            .map(|r| r.finished)
            .unwrap_or(false)
    }

    /// Finishers in order, then everyone else by current ranking
    pub fn results(&self) -> Vec<RaceResult> {
        let mut results = self.finish_order.clone();
        for racer in self.tracker.ranking() {
            if results.iter().any(|r| r.racer_id == racer.handle.0) {
                continue;
            }
            results.push(RaceResult {
                racer_id: racer.handle.0,
                racer_name: racer.name.clone(),
                finish_time: None,
                position: (results.len() + 1) as u32,
            });
        }
        results
    }

    /// Get compact snapshot for IPC transfer
    pub fn get_snapshot(&self) -> RaceSnapshot {
        let ranking = self.tracker.ranking();
        let racers = self
            .tracker
            .racers()
            .iter()
            .map(|r| {
                let vehicle = &self.vehicles[r.position_key];
                RacerSnapshot {
                    id: r.handle.0,
                    name: r.name.clone(),
                    position: vehicle.position,
                    heading: vehicle.heading,
                    lap: r.lap_count,
                    next_checkpoint: r.next_checkpoint_index,
                    progress: r.progress_score,
                    rank: ranking
                        .iter()
                        .position(|o| o.handle == r.handle)
                        .map(|i| i + 1)
                        .unwrap_or(0),
                    finished: r.finished,
                }
            })
            .collect();

        RaceSnapshot {
            status: self.status,
            elapsed_time: self.tracker.elapsed_seconds(),
            countdown: self.countdown,
            racers,
            player: self.vehicles[Self::PLAYER_ID].status(&self.config.vehicle),
            hud: self.tracker.hud(self.handles[Self::PLAYER_ID]),
            finisher_count: self.finish_order.len() as u32,
        }
    }

    pub fn status(&self) -> RaceStatus {
        self.status
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn track(&self) -> &TrackDefinition {
        &self.track
    }

    pub fn tracker(&self) -> &RaceProgressTracker {
        &self.tracker
    }

    pub fn vehicles(&self) -> &[VehicleState] {
        &self.vehicles
    }

    pub fn player(&self) -> &VehicleState {
        &self.vehicles[Self::PLAYER_ID]
    }

    pub fn navigators(&self) -> &[AiNavigator] {
        &self.navigators
    }

    pub fn racer_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Start/finish point on the centerline
    pub fn start_position(&self) -> Vec3 {
        self.track.waypoints_main[0]
    }
}

/// Compact per-racer state for IPC transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RacerSnapshot {
    pub id: usize,
    pub name: String,
    pub position: Vec3,
    pub heading: f32,
    pub lap: u32,
    pub next_checkpoint: usize,
    pub progress: f32,
    pub rank: usize,
    pub finished: bool,
}

/// Compact race snapshot for IPC transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub status: RaceStatus,
    pub elapsed_time: f32,
    pub countdown: f32,
    pub racers: Vec<RacerSnapshot>,
    pub player: VehicleStatus,
    pub hud: Option<HudInfo>,
    pub finisher_count: u32,
}
