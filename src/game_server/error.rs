//! Error - Setup-time failures of the race core
//!
//! The per-tick simulation never fails; only building a race from a
//! configuration can.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaceError {
    #[error("invalid race configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed race configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no race has been initialized")]
    NoActiveRace,
}
