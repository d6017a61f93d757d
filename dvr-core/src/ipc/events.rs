//! Status events published by the control loop.
//!
//! These replace the LEDs and console messages of the device: a host
//! application subscribes with
//! [`StreamOrchestrator::subscribe_status`](crate::engine::StreamOrchestrator::subscribe_status)
//! and renders them however it likes.

use serde::{Deserialize, Serialize};

/// Current mode of the record/playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Mode {
    /// Idle; waiting for a record or play edge.
    Stopped = 0,
    /// Sampling into the buffer and draining pages to storage.
    Recording = 1,
    /// Refilling pages from storage and emitting samples.
    Playing = 2,
}

impl Mode {
    /// Decode a raw mode word. Returns `None` for values no mode maps to.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Mode::Stopped),
            1 => Some(Mode::Recording),
            2 => Some(Mode::Playing),
            _ => None,
        }
    }
}

/// Emitted whenever the state machine changes mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub mode: Mode,
    /// Optional human-readable detail (e.g. why a session ended).
    pub detail: Option<String>,
}
