//! Two-page staging buffer shared between the sample drivers and the control loop.
//!
//! The sample drivers move one byte at a time through [`DoubleBuffer::push`] /
//! [`DoubleBuffer::pop`]; each completed page is announced through a
//! [`PageEventSink`]. The control loop then moves whole pages to or from
//! storage with [`DoubleBuffer::take_full_page`] / [`DoubleBuffer::take_empty_page`]
//! while the drivers keep streaming through the other page.

pub mod double_buffer;

use std::sync::Arc;

pub use double_buffer::{DoubleBuffer, Page};

/// Default page size in bytes (one storage block).
pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Midscale value of an unsigned 8-bit sample.
pub const SILENCE: u8 = 0x80;

/// Raised by [`DoubleBuffer`] exactly when a byte-wise cursor crosses into a new page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The write cursor finished a page; it is ready to be drained to storage.
    Full,
    /// The read cursor finished a page; it is ready to be refilled from storage.
    Empty,
}

/// Receiver for page events.
///
/// Called from interrupt context (the tick thread): implementations must not
/// block, allocate or perform I/O.
pub trait PageEventSink: Send + Sync {
    fn on_page_event(&self, event: PageEvent);
}

impl<T: PageEventSink + ?Sized> PageEventSink for Arc<T> {
    fn on_page_event(&self, event: PageEvent) {
        (**self).on_page_event(event)
    }
}

/// Discards every event.
impl PageEventSink for () {
    fn on_page_event(&self, _event: PageEvent) {}
}
