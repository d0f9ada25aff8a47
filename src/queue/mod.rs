//! Event queueing and playback scheduling

pub mod handlers;
pub mod priority;
pub mod scheduler;

pub use handlers::{event_handler, EventHandler, HandlerError, HandlerRegistry};
pub use priority::{AnimationQueue, QueueStats};
pub use scheduler::{AnimationScheduler, CompletionHook, Playback, PlaybackSnapshot};
