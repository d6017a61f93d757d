//! Persistent sample storage.
//!
//! The control loop is the only caller: every method here may block for an
//! unbounded (but finite) time and must never be reached from the tick thread.
//!
//! A stream is a 44-byte RIFF/WAVE header followed by raw unsigned 8-bit
//! samples. See [`wave`] for the header layout.

pub mod fs;
pub mod memory;
pub mod wave;

pub use fs::DirStorage;
pub use memory::MemoryStorage;
pub use wave::{WaveFormat, WaveHeader, WaveStream};

use crate::error::Result;

/// A named-stream store (an SD card directory, a host directory, memory).
pub trait Storage: Send {
    type Stream: SampleStream;

    /// Create (or truncate) `name` and write a placeholder header for `format`.
    fn create_stream(&mut self, name: &str, format: WaveFormat) -> Result<Self::Stream>;

    /// Open an existing stream and read its header.
    fn open_stream(&mut self, name: &str) -> Result<Self::Stream>;
}

/// An open stream positioned after its header.
pub trait SampleStream: Send {
    /// Read up to `buf.len()` bytes. A return value smaller than the request
    /// means the end of the stream was reached.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf`, returning the number of bytes the device accepted.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize>;

    /// Samples in the stream: the header's count for opened streams, the
    /// number written so far for created ones.
    fn sample_count(&self) -> u32;

    /// Close the stream. Streams created with [`Storage::create_stream`] have
    /// their header finalized with the true sample count first.
    fn close(self) -> Result<()>;
}
