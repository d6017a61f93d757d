//! RIFF/WAVE container for uncompressed PCM.
//!
//! ```text
//! offset  size  field
//!  0      4     "RIFF"
//!  4      4     ChunkSize      = 36 + dataSize   (0 until finalized)
//!  8      4     "WAVE"
//! 12      4     "fmt "
//! 16      4     fmt size       = 16
//! 20      2     AudioFormat    = 1 (PCM)
//! 22      2     NumChannels
//! 24      4     SampleRate
//! 28      4     ByteRate       = SampleRate * BlockAlign
//! 32      2     BlockAlign     = NumChannels * BitsPerSample / 8
//! 34      2     BitsPerSample
//! 36      4     "data"
//! 40      4     dataSize       (0 until finalized)
//! ```
//!
//! All integers are little-endian.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::error::{DvrError, Result};
use crate::storage::SampleStream;

pub const HEADER_LEN: usize = 44;

const CHUNK_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
const FMT_CHUNK_LEN: u32 = 16;
const PCM_FORMAT: u16 = 1;

/// Sample layout of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// Mono, unsigned 8-bit: the only layout the pipeline records and plays.
    pub fn mono_u8(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 8,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

/// Decoded 44-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveHeader {
    pub format: WaveFormat,
    pub chunk_size: u32,
    pub data_size: u32,
}

impl WaveHeader {
    /// Header written at creation time, before the sample count is known.
    pub fn placeholder(format: WaveFormat) -> Self {
        Self {
            format,
            chunk_size: 0,
            data_size: 0,
        }
    }

    /// Header describing `data_size` bytes of samples.
    pub fn finalized(format: WaveFormat, data_size: u32) -> Self {
        Self {
            format,
            chunk_size: 36 + data_size,
            data_size,
        }
    }

    /// Number of sample frames reported by the header.
    pub fn sample_count(&self) -> u32 {
        match self.format.block_align() {
            0 => 0,
            align => self.data_size / u32::from(align),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let f = &self.format;
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.chunk_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
        out[22..24].copy_from_slice(&f.channels.to_le_bytes());
        out[24..28].copy_from_slice(&f.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&f.byte_rate().to_le_bytes());
        out[32..34].copy_from_slice(&f.block_align().to_le_bytes());
        out[34..36].copy_from_slice(&f.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(DvrError::InvalidHeader("missing RIFF/WAVE markers"));
        }
        if &bytes[12..16] != b"fmt " || u32_at(16) != FMT_CHUNK_LEN {
            return Err(DvrError::InvalidHeader("missing PCM fmt chunk"));
        }
        if u16_at(20) != PCM_FORMAT {
            return Err(DvrError::InvalidHeader("audio format is not PCM"));
        }
        if &bytes[36..40] != b"data" {
            return Err(DvrError::InvalidHeader("missing data chunk"));
        }

        Ok(Self {
            format: WaveFormat {
                sample_rate: u32_at(24),
                channels: u16_at(22),
                bits_per_sample: u16_at(34),
            },
            chunk_size: u32_at(4),
            data_size: u32_at(40),
        })
    }
}

pub fn write_header<W: Write>(w: &mut W, header: &WaveHeader) -> Result<()> {
    w.write_all(&header.to_bytes())?;
    Ok(())
}

pub fn read_header<R: Read>(r: &mut R) -> Result<WaveHeader> {
    let mut bytes = [0u8; HEADER_LEN];
    r.read_exact(&mut bytes).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DvrError::InvalidHeader("truncated header"),
        _ => DvrError::Io(e),
    })?;
    WaveHeader::parse(&bytes)
}

/// A WAVE stream over any seekable byte store.
#[derive(Debug)]
pub struct WaveStream<F> {
    inner: F,
    header: WaveHeader,
    written: u32,
    /// Set for created streams: the header must be rewritten on close.
    finalize: bool,
}

impl<F: Read + Write + Seek> WaveStream<F> {
    /// Start a new stream in `inner`, writing a placeholder header.
    pub fn create(mut inner: F, format: WaveFormat) -> Result<Self> {
        let header = WaveHeader::placeholder(format);
        inner.seek(SeekFrom::Start(0))?;
        write_header(&mut inner, &header)?;
        Ok(Self {
            inner,
            header,
            written: 0,
            finalize: true,
        })
    }

    /// Read the header of an existing stream. Only mono 8-bit streams are accepted.
    pub fn open(mut inner: F) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let header = read_header(&mut inner)?;
        if header.format.channels != 1 || header.format.bits_per_sample != 8 {
            return Err(DvrError::UnsupportedFormat {
                channels: header.format.channels,
                bits_per_sample: header.format.bits_per_sample,
            });
        }
        Ok(Self {
            inner,
            header,
            written: 0,
            finalize: false,
        })
    }

    pub fn header(&self) -> &WaveHeader {
        &self.header
    }

    /// Finalize the header (created streams only) and hand back the byte store.
    pub fn finish(mut self) -> Result<F> {
        if self.finalize {
            let data_size = self.written * u32::from(self.header.format.block_align());
            self.header = WaveHeader::finalized(self.header.format, data_size);

            self.inner.seek(SeekFrom::Start(CHUNK_SIZE_OFFSET))?;
            self.inner.write_all(&self.header.chunk_size.to_le_bytes())?;
            self.inner.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
            self.inner.write_all(&self.header.data_size.to_le_bytes())?;
            self.inner.seek(SeekFrom::End(0))?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<F: Read + Write + Seek + Send> SampleStream for WaveStream<F> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            match self.inner.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(done)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        let mut done = 0;
        let outcome = loop {
            if done == buf.len() {
                break Ok(());
            }
            match self.inner.write(&buf[done..]) {
                Ok(0) => break Ok(()),
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        // Count what reached the device even when the write failed part-way.
        let frames = done / usize::from(self.header.format.block_align().max(1));
        self.written = self.written.saturating_add(frames as u32);
        outcome?;
        Ok(done)
    }

    fn sample_count(&self) -> u32 {
        if self.finalize {
            self.written
        } else {
            self.header.sample_count()
        }
    }

    fn close(self) -> Result<()> {
        self.finish().map(drop)
    }
}
