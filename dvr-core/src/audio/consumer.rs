//! Playback driver: one sample out of the buffer every `divisor` output ticks.
//!
//! The output timer runs faster than the playback rate so the same timing
//! source can pace other periodic work; non-qualifying ticks do nothing.

use std::sync::Arc;

use crate::audio::AnalogOutput;
use crate::engine::session::PipelineState;

pub struct SampleConsumer<K> {
    output: K,
    state: Arc<PipelineState>,
    divisor: u32,
    counter: u32,
    armed: bool,
}

impl<K: AnalogOutput> SampleConsumer<K> {
    /// `divisor` of 0 is treated as 1 (emit on every tick).
    pub fn new(output: K, state: Arc<PipelineState>, divisor: u32) -> Self {
        Self {
            output,
            state,
            divisor: divisor.max(1),
            counter: 0,
            armed: false,
        }
    }

    /// Service one output tick.
    pub fn tick(&mut self) {
        let enabled = self.state.flags.output_enabled();
        if enabled != self.armed {
            if enabled {
                self.counter = 0;
                self.output.start_output();
            } else {
                self.output.stop_output();
            }
            self.armed = enabled;
        }

        if !enabled {
            return;
        }

        self.counter += 1;
        if self.counter >= self.divisor {
            self.counter = 0;
            let sample = self.state.buffer.pop();
            self.output.write(sample);
        }
    }

    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    pub fn output(&self) -> &K {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut K {
        &mut self.output
    }
}
