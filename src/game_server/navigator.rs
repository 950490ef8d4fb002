//! Navigator - Waypoint following for bots
//!
//! A bot chases one waypoint at a time and hands the resulting control
//! intent to the shared vehicle update. Cycling through its path is its
//! own business; official laps come from the progress tracker only.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

use crate::game_server::error::RaceError;
use crate::game_server::track::NavigationData;
use crate::game_server::vehicle::{ControlIntent, VehicleState, VehicleTuning};

/// Which waypoint ring a bot follows, fixed at race setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathChoice {
    Main,
    Shortcut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorTuning {
    /// Planar distance at which a waypoint counts as reached
    pub arrival_threshold: f32,
    /// Heading correction cap (rad/s)
    pub max_turn_rate: f32,
}

impl Default for NavigatorTuning {
    fn default() -> Self {
        Self {
            arrival_threshold: 2.5,
            max_turn_rate: 3.0,
        }
    }
}

impl NavigatorTuning {
    pub fn validate(&self) -> Result<(), RaceError> {
        if !self.arrival_threshold.is_finite() || self.arrival_threshold < 0.0 {
            return Err(RaceError::InvalidConfig(
                "navigator arrival threshold must be finite and non-negative".into(),
            ));
        }
        if !self.max_turn_rate.is_finite() || self.max_turn_rate < 0.0 {
            return Err(RaceError::InvalidConfig(
                "navigator max turn rate must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Shortest signed angle, in `[-PI, PI)`
pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Heading that faces along a planar direction
pub fn heading_towards(direction: Vec3) -> f32 {
    direction.x.atan2(-direction.z)
}

fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiNavigator {
    choice: PathChoice,
    target: usize,
    /// Times the path index wrapped back to 0
    cycles: u32,
}

impl AiNavigator {
    pub fn new(choice: PathChoice) -> Self {
        Self {
            choice,
            target: 0,
            cycles: 0,
        }
    }

    pub fn choice(&self) -> PathChoice {
        self.choice
    }

    pub fn target_index(&self) -> usize {
        self.target
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// The waypoint ring this bot was assigned
    pub fn path<'a>(&self, nav: &NavigationData<'a>) -> &'a [Vec3] {
        match self.choice {
            PathChoice::Main => nav.waypoints_main,
            PathChoice::Shortcut => nav.waypoints_shortcut,
        }
    }

    /// Control intent for this tick, `None` when there is nothing to follow
    pub fn steer(
        &mut self,
        state: &VehicleState,
        path: &[Vec3],
        vehicle: &VehicleTuning,
        tuning: &NavigatorTuning,
        dt: f32,
    ) -> Option<ControlIntent> {
        if path.is_empty() {
            return None;
        }
        self.target %= path.len();

        let mut to_target = planar(path[self.target] - state.position);
        if to_target.length_squared() < tuning.arrival_threshold * tuning.arrival_threshold {
            self.target = (self.target + 1) % path.len();
            if self.target == 0 {
                self.cycles += 1;
            }
            log::debug!("Bot advancing to waypoint {}", self.target);
            to_target = planar(path[self.target] - state.position);
        }

        let desired = if to_target.length_squared() > 1e-12 {
            heading_towards(to_target)
        } else {
            state.heading
        };
        let diff = wrap_angle(desired - state.heading);

        let max_step = tuning.max_turn_rate * dt.max(0.0);
        let step = diff.clamp(-max_step, max_step);

        // Express the wanted heading change in steering units
        let per_tick = vehicle.effective_turn_rate(state.speed, false) * dt.max(0.0);
        let steer = if per_tick > 1e-6 {
            (step / per_tick).clamp(-1.0, 1.0)
        } else if step.abs() > 0.0 {
            step.signum()
        } else {
            0.0
        };

        Some(ControlIntent::full_throttle(steer))
    }
}
