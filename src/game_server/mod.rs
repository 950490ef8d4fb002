//! Game Server Module
//!
//! Race simulation core: track generation, shared vehicle kinematics,
//! bot navigation and lap/ranking progress. The web front-end renders and
//! polls input; everything here is a deterministic step function of the
//! per-tick input and elapsed time.

pub mod error;
pub mod navigator;
pub mod progress;
pub mod race;
pub mod simulation;
pub mod track;
pub mod vehicle;

pub use error::RaceError;
pub use navigator::{AiNavigator, NavigatorTuning, PathChoice};
pub use progress::{
    HudInfo, PositionSource, ProgressEvent, RaceProgressTracker, RacerHandle, RacerState,
};
pub use race::{Race, RaceConfig, RaceResult, RaceSnapshot, RaceStatus, RacerSnapshot};
pub use simulation::{GameServer, GameState, ServerStats};
pub use track::{Lcg, MeshView, NavigationData, TrackDefinition, TrackParams};
pub use vehicle::{ControlIntent, Vehicle, VehicleState, VehicleStatus, VehicleTuning};
