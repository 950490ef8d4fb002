//! Simulation - Main game server and tick driver
//!
//! Manages the game server state, runs one race tick per frame with the
//! caller's elapsed time and input snapshot, and provides the interface
//! for the front-end bridge.

use std::time::Instant;
use serde::{Deserialize, Serialize};
use crate::game_server::error::RaceError;
use crate::game_server::race::{Race, RaceConfig, RaceResult, RaceSnapshot, RaceStatus};
use crate::game_server::track::TrackDefinition;
use crate::game_server::vehicle::ControlIntent;

/// Longest step a single tick may simulate
const MAX_TICK_SECONDS: f32 = 0.1;
/// Tick compute times kept for the average
const TICK_HISTORY: usize = 60;

/// Game state as seen by the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Idle,
    Loading,
    Ready,
    Racing,
    Results,
}

/// Server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub tick_rate: f32,
    pub avg_tick_time_ms: f32,
    pub racer_count: u32,
    pub game_state: GameState,
}

/// Main game server
pub struct GameServer {
    /// Current game state
    state: GameState,
    /// Active race (if any)
    race: Option<Race>,
    /// Target tick rate (ticks per second)
    tick_rate: f32,
    /// Recent tick compute times (ms)
    tick_times: Vec<f32>,
    /// Whether the simulation advances on tick
    running: bool,
}

impl GameServer {
    /// Create a new game server
    pub fn new() -> Self {
        Self {
            state: GameState::Idle,
            race: None,
            tick_rate: 60.0,
            tick_times: Vec::with_capacity(TICK_HISTORY),
            running: false,
        }
    }

    /// Initialize a new race with given config
    pub fn init_race(&mut self, config: RaceConfig) -> Result<(), RaceError> {
        self.state = GameState::Loading;
        self.running = false;
        self.tick_times.clear();

        match Race::new(config) {
            Ok(race) => {
                self.race = Some(race);
                self.state = GameState::Ready;
                Ok(())
            }
            Err(e) => {
                log::warn!("Race setup rejected: {}", e);
                self.race = None;
                self.state = GameState::Idle;
                Err(e)
            }
        }
    }

    /// Start the race countdown
    pub fn start_race(&mut self) -> Result<(), RaceError> {
        let race = self.race.as_mut().ok_or(RaceError::NoActiveRace)?;
        race.start_countdown();
        self.state = GameState::Racing;
        self.running = true;
        Ok(())
    }

    /// Perform a single simulation tick of `delta` seconds
    pub fn tick(&mut self, delta: f32, input: &ControlIntent) -> Option<RaceSnapshot> {
        if !self.running {
            return self.get_snapshot();
        }

        let delta = if delta.is_finite() {
            delta.clamp(0.0, MAX_TICK_SECONDS)
        } else {
            0.0
        };

        // Track tick timing
        let tick_start = Instant::now();

        if let Some(race) = &mut self.race {
            race.update(delta, input);

            if race.status() == RaceStatus::Finished && self.state != GameState::Results {
                self.state = GameState::Results;
                log::info!("Results ready");
            }
        }

        // Record tick time
        let tick_time = tick_start.elapsed().as_secs_f32() * 1000.0;
        self.tick_times.push(tick_time);
        if self.tick_times.len() > TICK_HISTORY {
            self.tick_times.remove(0);
        }

        self.get_snapshot()
    }

    /// Get current race snapshot
    pub fn get_snapshot(&self) -> Option<RaceSnapshot> {
        self.race.as_ref().map(|r| r.get_snapshot())
    }

    /// Get race results
    pub fn get_results(&self) -> Option<Vec<RaceResult>> {
        self.race.as_ref().map(|r| r.results())
    }

    /// Get the generated track
    pub fn get_track(&self) -> Option<&TrackDefinition> {
        self.race.as_ref().map(|r| r.track())
    }

    pub fn race(&self) -> Option<&Race> {
        self.race.as_ref()
    }

    /// Get server statistics
    pub fn get_stats(&self) -> ServerStats {
        let avg_tick_time = if self.tick_times.is_empty() {
            0.0
        } else {
            self.tick_times.iter().sum::<f32>() / self.tick_times.len() as f32
        };

        ServerStats {
            tick_rate: self.tick_rate,
            avg_tick_time_ms: avg_tick_time,
            racer_count: self.race.as_ref().map(|r| r.racer_count() as u32).unwrap_or(0),
            game_state: self.state,
        }
    }

    /// Get current game state
    pub fn get_state(&self) -> GameState {
        self.state
    }

    /// Reset to idle state
    pub fn reset(&mut self) {
        self.state = GameState::Idle;
        self.race = None;
        self.running = false;
        self.tick_times.clear();
    }

    /// Pause the simulation
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume the simulation
    pub fn resume(&mut self) {
        if self.state == GameState::Racing {
            self.running = true;
        }
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for GameServer {
    fn default() -> Self {
        Self::new()
    }
}
