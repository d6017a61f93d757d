//! In-memory storage, shared between clones.
//!
//! Useful for host-side simulation and tests: a clone kept by the caller
//! can inspect what the control loop wrote.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DvrError, Result};
use crate::storage::{SampleStream, Storage, WaveFormat, WaveStream};

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Files,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw bytes (header included) of `name`.
    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.files.lock().insert(name.to_string(), bytes);
    }

    /// Raw bytes (header included) of `name`, as last committed by `close`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }
}

impl Storage for MemoryStorage {
    type Stream = MemoryStream;

    fn create_stream(&mut self, name: &str, format: WaveFormat) -> Result<Self::Stream> {
        let inner = WaveStream::create(Cursor::new(Vec::new()), format)?;
        Ok(MemoryStream {
            name: name.to_string(),
            inner,
            files: Arc::clone(&self.files),
        })
    }

    fn open_stream(&mut self, name: &str) -> Result<Self::Stream> {
        let bytes = self
            .get(name)
            .ok_or_else(|| DvrError::StreamNotFound { name: name.into() })?;
        let inner = WaveStream::open(Cursor::new(bytes))?;
        Ok(MemoryStream {
            name: name.to_string(),
            inner,
            files: Arc::clone(&self.files),
        })
    }
}

/// A stream whose bytes are committed back to its [`MemoryStorage`] on close.
#[derive(Debug)]
pub struct MemoryStream {
    name: String,
    inner: WaveStream<Cursor<Vec<u8>>>,
    files: Files,
}

impl SampleStream for MemoryStream {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read_bytes(buf)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        self.inner.write_bytes(buf)
    }

    fn sample_count(&self) -> u32 {
        self.inner.sample_count()
    }

    fn close(self) -> Result<()> {
        let bytes = self.inner.finish()?.into_inner();
        self.files.lock().insert(self.name, bytes);
        Ok(())
    }
}
