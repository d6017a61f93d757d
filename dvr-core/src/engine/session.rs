//! State shared between the tick thread and the control loop.
//!
//! Everything here is a single atomic word. The tick thread only ever
//! touches it through [`PageEventSink::on_page_event`] and the driver enable
//! flags; all other mutation happens on the control loop.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
    Arc,
};

use crate::{
    buffering::{DoubleBuffer, PageEvent, PageEventSink},
    engine::EngineConfig,
    ipc::events::Mode,
};

/// Session bookkeeping: mode, page countdown, deferred-work flags and the
/// driver enable switches.
#[derive(Debug)]
pub struct SessionFlags {
    pub(crate) mode: AtomicU8,
    countdown: AtomicU32,
    pending_page: AtomicBool,
    complete: AtomicBool,
    sampling: AtomicBool,
    output: AtomicBool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            mode: AtomicU8::new(Mode::Stopped as u8),
            countdown: AtomicU32::new(0),
            pending_page: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            sampling: AtomicBool::new(false),
            output: AtomicBool::new(false),
        }
    }
}

impl SessionFlags {
    /// Current mode, or `None` if the mode word holds no valid mode.
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_raw(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Arm a new session that ends after `pages` page events.
    pub(crate) fn begin(&self, pages: u32) {
        self.countdown.store(pages, Ordering::Release);
        self.pending_page.store(false, Ordering::Release);
        self.complete.store(false, Ordering::Release);
    }

    /// Make the next page event the last one of the session.
    pub(crate) fn finish_after_current_page(&self) {
        self.countdown.store(1, Ordering::Release);
    }

    pub fn remaining_pages(&self) -> u32 {
        self.countdown.load(Ordering::Acquire)
    }

    /// Acknowledge the pending-page flag. Returns whether it was set.
    pub(crate) fn take_pending(&self) -> bool {
        self.pending_page.swap(false, Ordering::AcqRel)
    }

    /// Acknowledge the completion flag. Returns whether it was set.
    pub(crate) fn take_complete(&self) -> bool {
        self.complete.swap(false, Ordering::AcqRel)
    }

    pub fn sampling_enabled(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    pub(crate) fn set_sampling(&self, enabled: bool) {
        self.sampling.store(enabled, Ordering::Release);
    }

    pub fn output_enabled(&self) -> bool {
        self.output.load(Ordering::Acquire)
    }

    pub(crate) fn set_output(&self, enabled: bool) {
        self.output.store(enabled, Ordering::Release);
    }
}

impl PageEventSink for SessionFlags {
    fn on_page_event(&self, event: PageEvent) {
        let previous = self
            .countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);

        if previous <= 1 {
            // Last page: stop the driver that raised it, no further events.
            match event {
                PageEvent::Full => self.set_sampling(false),
                PageEvent::Empty => self.set_output(false),
            }
            self.complete.store(true, Ordering::Release);
        } else {
            self.pending_page.store(true, Ordering::Release);
        }
    }
}

/// The buffer and flags shared by the sample drivers and the control loop.
///
/// Created once and handed out as `Arc<PipelineState>`.
#[derive(Debug)]
pub struct PipelineState {
    pub flags: Arc<SessionFlags>,
    pub buffer: DoubleBuffer<Arc<SessionFlags>>,
}

impl PipelineState {
    pub fn new(config: &EngineConfig) -> Self {
        let flags = Arc::new(SessionFlags::default());
        let buffer = DoubleBuffer::new(config.page_size, Arc::clone(&flags))
            .detect_overruns(config.detect_overruns);
        Self { flags, buffer }
    }
}
