use thiserror::Error;

/// All errors produced by dvr-core.
///
/// None of these are raised from interrupt context: the per-sample paths
/// (`push`, `pop`, driver ticks, page events) are infallible.
#[derive(Debug, Error)]
pub enum DvrError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("invalid WAVE header: {0}")]
    InvalidHeader(&'static str),

    #[error("unsupported stream format: {channels} channel(s), {bits_per_sample} bits per sample")]
    UnsupportedFormat { channels: u16, bits_per_sample: u16 },

    #[error("stream not found: {name}")]
    StreamNotFound { name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DvrError>;
