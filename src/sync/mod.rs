//! Orchestration of expression and lip-sync sequences

pub mod state;
pub mod synchronizer;

pub use state::{AnimationStateSnapshot, EngineState};
pub use synchronizer::AnimationSynchronizer;
