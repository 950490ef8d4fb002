//! Vehicle - Arcade kinematics shared by the player and the bots
//!
//! One update routine advances speed, heading and position from a
//! normalized control intent. Drifting widens the turn and builds up a
//! timer that can be cashed in for a short boost.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game_server::error::RaceError;

/// Normalized control input for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlIntent {
    /// Throttle (0-1)
    pub accelerate: f32,
    /// Brake (0-1)
    pub brake: f32,
    /// Steering (-1 left, +1 right)
    pub steer: f32,
    pub drift: bool,
    pub boost: bool,
}

fn clamp_or_zero(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

impl ControlIntent {
    /// Full throttle, nothing else
    pub fn full_throttle(steer: f32) -> Self {
        Self {
            accelerate: 1.0,
            steer,
            ..Default::default()
        }
    }

    /// Copy with every analog value forced into its documented range
    pub fn clamped(&self) -> Self {
        Self {
            accelerate: clamp_or_zero(self.accelerate, 0.0, 1.0),
            brake: clamp_or_zero(self.brake, 0.0, 1.0),
            steer: clamp_or_zero(self.steer, -1.0, 1.0),
            drift: self.drift,
            boost: self.boost,
        }
    }
}

/// Handling constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleTuning {
    pub base_max_speed: f32,
    pub base_accel: f32,
    pub brake_force: f32,
    /// Fraction of speed lost per second
    pub drag: f32,
    /// Turn rate at full steering lock (rad/s)
    pub turn_rate: f32,
    /// Speed at which steering reaches full authority
    pub full_turn_speed: f32,
    pub drift_turn_bonus: f32,
    /// Lateral slip as a fraction of forward speed
    pub drift_slip: f32,
    pub min_drift_slip_speed: f32,
    pub drift_drag_multiplier: f32,
    pub max_drift_time: f32,
    /// Drift time needed before a boost is granted
    pub boost_drift_threshold: f32,
    pub boost_duration: f32,
    pub boost_max_speed_multiplier: f32,
    pub boost_accel_multiplier: f32,
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            base_max_speed: 12.0,
            base_accel: 18.0,
            brake_force: 20.0,
            drag: 2.2,
            turn_rate: 2.4,
            full_turn_speed: 4.0,
            drift_turn_bonus: 1.5,
            drift_slip: 0.25,
            min_drift_slip_speed: 2.0,
            drift_drag_multiplier: 0.9,
            max_drift_time: 2.0,
            boost_drift_threshold: 0.5,
            boost_duration: 1.2,
            boost_max_speed_multiplier: 1.35,
            boost_accel_multiplier: 1.25,
        }
    }
}

impl VehicleTuning {
    /// Speed cap, raised while boosting
    pub fn max_speed(&self, boosting: bool) -> f32 {
        if boosting {
            self.base_max_speed * self.boost_max_speed_multiplier
        } else {
            self.base_max_speed
        }
    }

    /// Steering authority at a given speed, 0 at standstill, 1 at full
    pub fn speed_factor(&self, speed: f32) -> f32 {
        if self.full_turn_speed <= 0.0 {
            return 1.0;
        }
        (speed / self.full_turn_speed).clamp(0.0, 1.0)
    }

    /// Heading change per second at full lock for the given speed
    pub fn effective_turn_rate(&self, speed: f32, drifting: bool) -> f32 {
        let bonus = if drifting { self.drift_turn_bonus } else { 1.0 };
        self.turn_rate * bonus * self.speed_factor(speed)
    }

    /// Every constant must be finite and non-negative
    pub fn validate(&self) -> Result<(), RaceError> {
        let fields = [
            ("base_max_speed", self.base_max_speed),
            ("base_accel", self.base_accel),
            ("brake_force", self.brake_force),
            ("drag", self.drag),
            ("turn_rate", self.turn_rate),
            ("full_turn_speed", self.full_turn_speed),
            ("drift_turn_bonus", self.drift_turn_bonus),
            ("drift_slip", self.drift_slip),
            ("min_drift_slip_speed", self.min_drift_slip_speed),
            ("drift_drag_multiplier", self.drift_drag_multiplier),
            ("max_drift_time", self.max_drift_time),
            ("boost_drift_threshold", self.boost_drift_threshold),
            ("boost_duration", self.boost_duration),
            ("boost_max_speed_multiplier", self.boost_max_speed_multiplier),
            ("boost_accel_multiplier", self.boost_accel_multiplier),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(RaceError::InvalidConfig(format!(
                    "vehicle {} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if !self.max_speed(true).is_finite() {
            return Err(RaceError::InvalidConfig("boosted max speed overflows".into()));
        }
        Ok(())
    }
}

/// Kinematic state of one racer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub speed: f32,
    /// Radians, accumulated without wrapping
    pub heading: f32,
    pub position: Vec3,
    pub drift_timer: f32,
    pub boost_timer: f32,
    /// Drift input seen on the last update
    pub drifting: bool,
}

/// Read-only status consumed by effects and audio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub normalized_speed: f32,
    pub drifting: bool,
    pub boosting: bool,
    pub forward: Vec3,
}

impl VehicleState {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self {
            position,
            heading,
            ..Default::default()
        }
    }

    pub fn is_boosting(&self) -> bool {
        self.boost_timer > 0.0
    }

    /// Planar forward direction for the current heading
    pub fn forward(&self) -> Vec3 {
        forward_from_heading(self.heading)
    }

    /// Planar right direction for the current heading
    pub fn right(&self) -> Vec3 {
        Vec3::new(self.heading.cos(), 0.0, self.heading.sin())
    }

    pub fn status(&self, tuning: &VehicleTuning) -> VehicleStatus {
        let max_speed = tuning.max_speed(self.is_boosting());
        let normalized_speed = if max_speed > 0.0 {
            (self.speed / max_speed).clamp(0.0, 1.0)
        } else {
            0.0
        };
        VehicleStatus {
            normalized_speed,
            drifting: self.drifting,
            boosting: self.is_boosting(),
            forward: self.forward(),
        }
    }
}

/// Heading 0 faces -Z, positive headings turn toward +X
pub fn forward_from_heading(heading: f32) -> Vec3 {
    Vec3::new(heading.sin(), 0.0, -heading.cos())
}

/// Vehicle simulation logic
pub struct Vehicle;

impl Vehicle {
    /// Advance one racer by `dt` seconds
    pub fn update(
        state: &mut VehicleState,
        intent: &ControlIntent,
        tuning: &VehicleTuning,
        dt: f32,
    ) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let input = intent.clamped();
        let boosting = state.is_boosting();

        // Effective caps
        let max_speed = tuning.max_speed(boosting);
        let accel_bonus = if boosting { tuning.boost_accel_multiplier } else { 1.0 };
        let accel_force = tuning.base_accel * input.accelerate * accel_bonus;
        let brake_force = tuning.brake_force * input.brake;
        let drag = if input.drift {
            tuning.drag * tuning.drift_drag_multiplier
        } else {
            tuning.drag
        };

        // Speed
        state.speed += (accel_force - brake_force) * dt;
        state.speed -= state.speed * drag * dt;
        state.speed = state.speed.clamp(0.0, max_speed);

        // Steering
        let turn_rate = tuning.effective_turn_rate(state.speed, input.drift);
        state.heading += input.steer * turn_rate * dt;

        // Position, with an outward slide while drifting
        let mut velocity = state.forward() * state.speed;
        if input.drift && state.speed > tuning.min_drift_slip_speed {
            velocity -= state.right() * (input.steer * state.speed * tuning.drift_slip);
        }
        state.position += velocity * dt;
        state.drifting = input.drift;

        // Drift builds up, decays twice as fast
        let drift_before = state.drift_timer;
        state.drift_timer = if input.drift {
            (state.drift_timer + dt).min(tuning.max_drift_time)
        } else {
            (state.drift_timer - 2.0 * dt).max(0.0)
        };

        // Boost
        if state.boost_timer > 0.0 {
            state.boost_timer = (state.boost_timer - dt).max(0.0);
        }
        // Charge earned up to this tick counts even if drift was just released
        let drift_charge = drift_before.max(state.drift_timer);
        if input.boost
            && drift_charge > tuning.boost_drift_threshold
            && state.boost_timer <= 0.0
        {
            state.boost_timer = tuning.boost_duration;
            log::debug!("Boost triggered after {:.2}s of drift", drift_charge);
        }

        state.speed = state.speed.min(tuning.max_speed(state.is_boosting()));
    }
}
