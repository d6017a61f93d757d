//! Recording driver: one analog sample per sampling tick into the buffer.

use std::sync::Arc;

use crate::audio::AnalogSource;
use crate::engine::session::PipelineState;

pub struct SampleProducer<A> {
    source: A,
    state: Arc<PipelineState>,
    /// Whether the source has been started; follows the session's sampling flag.
    armed: bool,
}

impl<A: AnalogSource> SampleProducer<A> {
    pub fn new(source: A, state: Arc<PipelineState>) -> Self {
        Self {
            source,
            state,
            armed: false,
        }
    }

    /// Service one sampling tick.
    pub fn tick(&mut self) {
        let enabled = self.state.flags.sampling_enabled();
        if enabled != self.armed {
            if enabled {
                self.source.start_sampling();
            } else {
                self.source.stop_sampling();
            }
            self.armed = enabled;
        }

        if enabled {
            let sample = self.source.read_sample();
            self.state.buffer.push(sample);
        }
    }

    pub fn source(&self) -> &A {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut A {
        &mut self.source
    }
}
