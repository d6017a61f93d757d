//! Record/playback engine: configuration, shared session state, the
//! control-loop state machine and the host tick driver.
//!
//! ## Contexts
//!
//! ```text
//! tick thread ("interrupt")              control loop
//! ─────────────────────────              ────────────
//! SampleProducer::tick ─► push ─┐        StreamOrchestrator::tick
//! SampleConsumer::tick ◄─ pop ──┤           │  take_full_page / take_empty_page
//!                               ▼           ▼
//!                     DoubleBuffer ── PageEvent ──► SessionFlags
//!                                                   (pending / complete)
//! ```
//!
//! Only the control loop touches storage.

pub mod orchestrator;
pub mod session;
pub mod timer;

use serde::{Deserialize, Serialize};

use crate::{
    buffering::DEFAULT_PAGE_SIZE,
    error::{DvrError, Result},
    storage::WaveFormat,
};

pub use orchestrator::{DiagnosticsSnapshot, PipelineDiagnostics, StreamOrchestrator};
pub use session::{PipelineState, SessionFlags};
pub use timer::TickDriver;

/// Configuration for the record/playback pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Bytes per page; the buffer holds two pages. Default: 512.
    pub page_size: usize,
    /// Recording sample rate (Hz), written to the stream header. Default: 15625.
    pub sample_rate: u32,
    /// Frequency of the shared timing source (Hz). Default: 31250.
    pub output_tick_hz: u32,
    /// Output ticks per played sample. `None` derives it from
    /// `output_tick_hz / sample_rate`.
    pub playback_divisor: Option<u32>,
    /// Recording limit in pages. Default: 305 (≈10 s at the default rate).
    pub max_record_pages: u32,
    /// Name of the single stream the device records to and plays from.
    pub stream_name: String,
    /// Count cursors entering a page the control loop has not serviced yet.
    /// Default: on in debug builds.
    pub detect_overruns: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            sample_rate: 15_625,
            output_tick_hz: 31_250,
            playback_divisor: None,
            max_record_pages: 305,
            stream_name: "EGB240.WAV".into(),
            detect_overruns: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DvrError::InvalidConfig("page size must be non-zero".into()));
        }
        if self.sample_rate == 0 || self.output_tick_hz == 0 {
            return Err(DvrError::InvalidConfig("rates must be non-zero".into()));
        }
        if self.sample_rate > self.output_tick_hz {
            return Err(DvrError::InvalidConfig(format!(
                "sample rate {} exceeds tick rate {}",
                self.sample_rate, self.output_tick_hz
            )));
        }
        if self.max_record_pages == 0 {
            return Err(DvrError::InvalidConfig(
                "recording limit must be at least one page".into(),
            ));
        }
        if self.stream_name.trim().is_empty() {
            return Err(DvrError::InvalidConfig("stream name is empty".into()));
        }
        Ok(())
    }

    /// Buffer size in bytes (two pages).
    pub fn capacity(&self) -> usize {
        self.page_size * 2
    }

    /// Timing-source ticks per recorded sample.
    pub fn sampling_prescaler(&self) -> u32 {
        (self.output_tick_hz / self.sample_rate.max(1)).max(1)
    }

    /// Output ticks per played sample, with the default resolved.
    pub fn effective_playback_divisor(&self) -> u32 {
        self.playback_divisor
            .unwrap_or_else(|| self.sampling_prescaler())
            .max(1)
    }

    pub fn wave_format(&self) -> WaveFormat {
        WaveFormat::mono_u8(self.sample_rate)
    }
}
