//! Directory-backed storage: one file per stream.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DvrError, Result};
use crate::storage::{Storage, WaveFormat, WaveStream};

/// Stores streams as WAVE files under a root directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Use `root` as the stream directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for DirStorage {
    type Stream = WaveStream<File>;

    fn create_stream(&mut self, name: &str, format: WaveFormat) -> Result<Self::Stream> {
        let path = self.path_of(name);
        debug!(path = %path.display(), "creating stream");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        WaveStream::create(file, format)
    }

    fn open_stream(&mut self, name: &str) -> Result<Self::Stream> {
        let path = self.path_of(name);
        debug!(path = %path.display(), "opening stream");
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DvrError::StreamNotFound { name: name.into() },
            _ => DvrError::Io(e),
        })?;
        WaveStream::open(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SampleStream;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dvr-core-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn created_stream_round_trips_through_disk() {
        let dir = scratch_dir("fs-round-trip");
        let mut storage = DirStorage::new(&dir).unwrap();

        let mut stream = storage
            .create_stream("TAKE.WAV", WaveFormat::mono_u8(15_625))
            .unwrap();
        stream.write_bytes(&[7u8; 300]).unwrap();
        stream.close().unwrap();

        let len = fs::metadata(storage.path_of("TAKE.WAV")).unwrap().len();
        assert_eq!(len, 44 + 300);

        let mut stream = storage.open_stream("TAKE.WAV").unwrap();
        assert_eq!(stream.sample_count(), 300);
        let mut buf = vec![0u8; 512];
        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 300);
        assert!(buf[..300].iter().all(|&b| b == 7));
        stream.close().unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_stream_is_reported_by_name() {
        let dir = scratch_dir("fs-missing");
        let mut storage = DirStorage::new(&dir).unwrap();
        match storage.open_stream("NOPE.WAV") {
            Err(DvrError::StreamNotFound { name }) => assert_eq!(name, "NOPE.WAV"),
            other => panic!("expected StreamNotFound, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
