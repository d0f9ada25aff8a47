//! Viewer connection management and event fan-out

pub mod hub;
pub mod latency;
pub mod viewer;

pub use hub::{AcceptedViewer, BroadcastReport, ConnectionHub, HubConfig, InboundOutcome};
pub use latency::SampleWindow;
pub use viewer::ViewerHandle;
