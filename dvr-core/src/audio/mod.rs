//! Analog front-end boundary and the per-tick sample drivers.
//!
//! # Design constraints
//!
//! [`SampleProducer::tick`] and [`SampleConsumer::tick`] run in interrupt
//! context (the tick thread on a host). They **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! They touch nothing but the analog front-end, the [`DoubleBuffer`]
//! and the session's atomic enable flags. Page-level flow control is left
//! entirely to the page events the buffer raises.
//!
//! [`DoubleBuffer`]: crate::buffering::DoubleBuffer

pub mod consumer;
#[cfg(feature = "audio-cpal")]
pub mod host;
pub mod producer;
pub mod signal;

pub use consumer::SampleConsumer;
pub use producer::SampleProducer;

/// Analog input delivering one unsigned 8-bit sample per sampling tick.
pub trait AnalogSource: Send {
    /// Begin conversions. Called on the first tick after sampling is enabled.
    fn start_sampling(&mut self) {}

    /// Stop conversions. Called on the first tick after sampling is disabled.
    fn stop_sampling(&mut self) {}

    /// Latest conversion result.
    fn read_sample(&mut self) -> u8;
}

/// Analog (PWM/DAC) output accepting one unsigned 8-bit sample at a time.
pub trait AnalogOutput: Send {
    fn start_output(&mut self) {}

    fn stop_output(&mut self) {}

    fn write(&mut self, sample: u8);
}

impl<T: AnalogSource + ?Sized> AnalogSource for Box<T> {
    fn start_sampling(&mut self) {
        (**self).start_sampling()
    }

    fn stop_sampling(&mut self) {
        (**self).stop_sampling()
    }

    fn read_sample(&mut self) -> u8 {
        (**self).read_sample()
    }
}

impl<T: AnalogOutput + ?Sized> AnalogOutput for Box<T> {
    fn start_output(&mut self) {
        (**self).start_output()
    }

    fn stop_output(&mut self) {
        (**self).stop_output()
    }

    fn write(&mut self, sample: u8) {
        (**self).write(sample)
    }
}
