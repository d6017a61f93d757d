//! Host audio devices as the analog front-end.
//!
//! cpal callbacks run on the audio backend's thread; they exchange 8-bit
//! samples with the tick thread through wait-free `ringbuf` rings, so
//! neither side ever blocks the other. Rate conversion is nearest-sample:
//! the input callback decimates to the recording rate, the output callback
//! holds each played sample for as many device frames as it spans.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

use crate::audio::{AnalogOutput, AnalogSource};
use crate::buffering::SILENCE;
use crate::error::{DvrError, Result};

/// Ring capacity in samples (≈0.25 s at the default rate).
const RING_CAPACITY: usize = 4096;

/// Keeps a cpal stream alive. The stream is `!Send`: drop it on the thread
/// that opened it.
pub struct HostStream {
    _stream: cpal::Stream,
    device_rate: u32,
}

impl HostStream {
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

/// Samples captured from the default input device.
pub struct HostSource {
    rx: HeapCons<u8>,
    underruns: u64,
}

impl HostSource {
    /// Ticks on which no captured sample was available.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

impl AnalogSource for HostSource {
    fn start_sampling(&mut self) {
        // Drop audio captured while idle.
        while self.rx.try_pop().is_some() {}
    }

    fn read_sample(&mut self) -> u8 {
        match self.rx.try_pop() {
            Some(sample) => sample,
            None => {
                self.underruns += 1;
                SILENCE
            }
        }
    }
}

/// Samples played on the default output device.
pub struct HostOutput {
    tx: HeapProd<u8>,
    dropped: u64,
}

impl HostOutput {
    /// Samples discarded because the device fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl AnalogOutput for HostOutput {
    fn write(&mut self, sample: u8) {
        if self.tx.try_push(sample).is_err() {
            self.dropped += 1;
        }
    }
}

fn to_u8(value: f32) -> u8 {
    (128.0 + value.clamp(-1.0, 1.0) * 127.0).round() as u8
}

fn to_f32(sample: u8) -> f32 {
    (f32::from(sample) - 128.0) / 128.0
}

/// Open the default input device, delivering samples at `sample_rate`.
///
/// # Errors
/// `DvrError::AudioDevice` when no input device exists or its configuration
/// cannot be queried, `DvrError::AudioStream` if the stream cannot start.
pub fn open_host_input(sample_rate: u32) -> Result<(HostStream, HostSource)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DvrError::AudioDevice("no default input device".into()))?;
    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening input device"
    );

    let supported = device
        .default_input_config()
        .map_err(|e| DvrError::AudioDevice(e.to_string()))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let device_rate = config.sample_rate.0;
    info!(device_rate, channels = config.channels, ?format, "input config selected");

    let (tx, rx) = HeapRb::<u8>::new(RING_CAPACITY).split();
    let stream = match format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, tx, sample_rate),
        SampleFormat::I16 => build_input::<i16>(&device, &config, tx, sample_rate),
        SampleFormat::U8 => build_input::<u8>(&device, &config, tx, sample_rate),
        fmt => {
            return Err(DvrError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }?;
    stream
        .play()
        .map_err(|e| DvrError::AudioStream(e.to_string()))?;

    Ok((
        HostStream {
            _stream: stream,
            device_rate,
        },
        HostSource { rx, underruns: 0 },
    ))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut tx: HeapProd<u8>,
    sample_rate: u32,
) -> Result<cpal::Stream>
where
    T: SizedSample + 'static,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let step = f64::from(sample_rate) / f64::from(config.sample_rate.0.max(1));
    let mut phase = 0.0f64;
    let mut dropped = 0u64;

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                for frame in data.chunks(channels) {
                    phase += step;
                    if phase < 1.0 {
                        continue;
                    }
                    phase -= 1.0;
                    let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
                    if tx.try_push(to_u8(sum / frame.len() as f32)).is_err() {
                        dropped += 1;
                        if dropped.is_power_of_two() {
                            warn!(dropped, "input ring full");
                        }
                    }
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| DvrError::AudioStream(e.to_string()))
}

/// Open the default output device, consuming samples at `sample_rate`.
///
/// # Errors
/// As for [`open_host_input`].
pub fn open_host_output(sample_rate: u32) -> Result<(HostStream, HostOutput)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| DvrError::AudioDevice("no default output device".into()))?;
    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening output device"
    );

    let supported = device
        .default_output_config()
        .map_err(|e| DvrError::AudioDevice(e.to_string()))?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(DvrError::AudioStream(format!(
            "unsupported sample format: {:?}",
            supported.sample_format()
        )));
    }
    let config: StreamConfig = supported.into();
    let device_rate = config.sample_rate.0;
    let channels = usize::from(config.channels.max(1));
    info!(device_rate, channels, "output config selected");

    let (tx, mut rx) = HeapRb::<u8>::new(RING_CAPACITY).split();
    let step = f64::from(sample_rate) / f64::from(device_rate.max(1));
    let mut phase = 1.0f64;
    let mut current = 0.0f32;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info| {
                for frame in data.chunks_mut(channels) {
                    phase += step;
                    if phase >= 1.0 {
                        phase -= 1.0;
                        current = rx.try_pop().map(to_f32).unwrap_or(0.0);
                    }
                    frame.fill(current);
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        )
        .map_err(|e| DvrError::AudioStream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| DvrError::AudioStream(e.to_string()))?;

    Ok((
        HostStream {
            _stream: stream,
            device_rate,
        },
        HostOutput { tx, dropped: 0 },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_is_centred() {
        assert_eq!(to_u8(0.0), 128);
        assert_eq!(to_u8(1.0), 255);
        assert_eq!(to_u8(-1.0), 1);
        assert_eq!(to_u8(4.0), 255);
        assert_eq!(to_f32(SILENCE), 0.0);
    }

    #[test]
    fn empty_ring_reads_silence() {
        let (_tx, rx) = HeapRb::<u8>::new(8).split();
        let mut source = HostSource { rx, underruns: 0 };
        assert_eq!(source.read_sample(), SILENCE);
        assert_eq!(source.underruns(), 1);
    }

    #[test]
    fn full_ring_drops_output() {
        let (tx, _rx) = HeapRb::<u8>::new(2).split();
        let mut output = HostOutput { tx, dropped: 0 };
        for s in 0..3 {
            output.write(s);
        }
        assert_eq!(output.dropped(), 1);
    }
}
