//! # dvr-core
//!
//! Page-buffered digital voice recorder engine.
//!
//! ## Architecture
//!
//! ```text
//! AnalogSource → SampleProducer ─┐                 ┌─► Storage (WAVE stream)
//!                                ▼                 │
//!                         DoubleBuffer ── pages ── StreamOrchestrator ◄── UserInput
//!                                │                 │
//! AnalogOutput ◄ SampleConsumer ─┘                 └─► broadcast::Sender<EngineStatusEvent>
//! ```
//!
//! The sample drivers run on the tick thread and never block or allocate.
//! Every storage transfer happens on the control loop, one page at a time.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod input;
pub mod ipc;
pub mod storage;

// Convenience re-exports for downstream crates
pub use audio::{AnalogOutput, AnalogSource, SampleConsumer, SampleProducer};
pub use buffering::{DoubleBuffer, PageEvent, PageEventSink};
pub use engine::{EngineConfig, PipelineState, StreamOrchestrator, TickDriver};
pub use error::{DvrError, Result};
pub use input::{Button, Buttons, ChannelInput, UserInput};
pub use ipc::events::{EngineStatusEvent, Mode};
pub use storage::{DirStorage, MemoryStorage, SampleStream, Storage};
