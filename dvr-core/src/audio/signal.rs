//! Software stand-ins for the analog front-end.

use std::f32::consts::TAU;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::{AnalogOutput, AnalogSource};
use crate::buffering::SILENCE;

/// Produces 0, 1, 2, … wrapping at 256. Counts start/stop calls.
#[derive(Debug, Default)]
pub struct RampSource {
    next: u8,
    starts: usize,
    stops: usize,
}

impl RampSource {
    pub fn starts(&self) -> usize {
        self.starts
    }

    pub fn stops(&self) -> usize {
        self.stops
    }
}

impl AnalogSource for RampSource {
    fn start_sampling(&mut self) {
        self.starts += 1;
    }

    fn stop_sampling(&mut self) {
        self.stops += 1;
    }

    fn read_sample(&mut self) -> u8 {
        let sample = self.next;
        self.next = self.next.wrapping_add(1);
        sample
    }
}

/// Constant midscale input.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilenceSource;

impl AnalogSource for SilenceSource {
    fn read_sample(&mut self) -> u8 {
        SILENCE
    }
}

/// Sine tone quantised to unsigned 8 bits.
#[derive(Debug, Clone)]
pub struct SineSource {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl SineSource {
    /// `amplitude` is clamped to [0, 1] of full scale.
    pub fn new(frequency_hz: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency_hz / sample_rate as f32,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }
}

impl AnalogSource for SineSource {
    fn start_sampling(&mut self) {
        self.phase = 0.0;
    }

    fn read_sample(&mut self) -> u8 {
        let value = 128.0 + 127.0 * self.amplitude * self.phase.sin();
        self.phase = (self.phase + self.step) % TAU;
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl AnalogOutput for NullOutput {
    fn write(&mut self, _sample: u8) {}
}

/// Records every emitted sample; clones share the same log.
///
/// Pushing into the log may allocate, so this is for host-side simulation
/// and tests only.
#[derive(Debug, Default, Clone)]
pub struct CaptureOutput {
    samples: Arc<Mutex<Vec<u8>>>,
}

impl CaptureOutput {
    pub fn samples(&self) -> Vec<u8> {
        self.samples.lock().clone()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl AnalogOutput for CaptureOutput {
    fn write(&mut self, sample: u8) {
        self.samples.lock().push(sample);
    }
}
