//! Events crossing from the core to the host application.

pub mod events;

pub use events::{EngineStatusEvent, Mode};
