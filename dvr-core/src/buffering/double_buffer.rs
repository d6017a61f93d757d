//! Fixed-capacity circular byte buffer split into two pages.
//!
//! ```text
//!  0                page_size            capacity
//!  ├──── page 0 ────┼──── page 1 ────┤
//!  ▲ write / read cursors wrap back to 0
//! ```
//!
//! There is no occupancy tracking and no overflow or underflow protection:
//! if the control loop does not service a page before the drivers wrap back
//! onto it, data is silently overwritten (or stale data is replayed). When
//! ownership tracking is enabled, each such crossing is counted so the control
//! loop can report it.
//!
//! Page contents are stored as `AtomicU8` so that the tick thread and the
//! control loop can share the buffer without locks. Hand-over of a page is
//! ordered by the session flags (release on the driver side, acquire on the
//! control-loop side); the bytes themselves only need relaxed access.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use super::{PageEvent, PageEventSink};

/// Per-page hand-over tracking used to detect cursors entering a page the
/// control loop has not serviced yet.
struct PageOwnership {
    /// `true` while a page has been handed to the control loop and not yet taken back.
    held: [AtomicBool; 2],
    overruns: AtomicU32,
}

impl PageOwnership {
    fn new() -> Self {
        Self {
            held: [AtomicBool::new(false), AtomicBool::new(false)],
            overruns: AtomicU32::new(0),
        }
    }

    fn reset(&self) {
        for held in &self.held {
            held.store(false, Ordering::Relaxed);
        }
    }

    /// A cursor is about to touch the first byte of `page`.
    fn entering(&self, page: usize) {
        if self.held[page].load(Ordering::Relaxed) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A cursor just finished `page`; it now belongs to the control loop.
    fn handed_over(&self, page: usize) {
        self.held[page].store(true, Ordering::Relaxed);
    }

    fn release(&self, page: usize) {
        self.held[page].store(false, Ordering::Relaxed);
    }
}

/// Two-page circular byte buffer with page-boundary events.
pub struct DoubleBuffer<E> {
    bytes: Box<[AtomicU8]>,
    page_size: usize,
    write: AtomicUsize,
    read: AtomicUsize,
    events: E,
    ownership: Option<PageOwnership>,
}

impl<E: PageEventSink> DoubleBuffer<E> {
    /// Create a buffer of `2 * page_size` bytes that reports page crossings to `events`.
    ///
    /// # Panics
    /// Panics if `page_size` is zero.
    pub fn new(page_size: usize, events: E) -> Self {
        assert!(page_size > 0, "page size must be non-zero");
        let bytes = (0..page_size * 2)
            .map(|_| AtomicU8::new(super::SILENCE))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            bytes,
            page_size,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            events,
            ownership: None,
        }
    }

    /// Enable or disable page ownership tracking (see [`Self::overrun_count`]).
    pub fn detect_overruns(mut self, enabled: bool) -> Self {
        self.ownership = enabled.then(PageOwnership::new);
        self
    }

    /// Store `byte` at the write cursor and advance it.
    ///
    /// Raises [`PageEvent::Full`] when the cursor reaches the top of page 1
    /// or wraps to the top of page 0.
    pub fn push(&self, byte: u8) {
        let at = self.write.load(Ordering::Relaxed);
        self.track_entry(at);
        self.bytes[at].store(byte, Ordering::Relaxed);
        let next = self.advance(at);
        self.write.store(next, Ordering::Release);

        if next % self.page_size == 0 {
            self.track_hand_over(at);
            self.events.on_page_event(PageEvent::Full);
        }
    }

    /// Load the byte at the read cursor and advance it.
    ///
    /// Raises [`PageEvent::Empty`] on the same boundaries as [`Self::push`].
    pub fn pop(&self) -> u8 {
        let at = self.read.load(Ordering::Relaxed);
        self.track_entry(at);
        let byte = self.bytes[at].load(Ordering::Relaxed);
        let next = self.advance(at);
        self.read.store(next, Ordering::Release);

        if next % self.page_size == 0 {
            self.track_hand_over(at);
            self.events.on_page_event(PageEvent::Empty);
        }
        byte
    }

    /// Hand the page at the read cursor to the caller for a bulk read and move
    /// the read cursor to the top of the other page.
    ///
    /// The read cursor is expected to be page-aligned; this is not checked.
    /// A cursor anywhere past the top of page 0 yields page 1. No event is raised.
    pub fn take_full_page(&self) -> Page<'_> {
        let index = Self::take(&self.read, self.page_size);
        self.page(index)
    }

    /// Hand the page at the write cursor to the caller for a bulk write and
    /// move the write cursor to the top of the other page.
    ///
    /// Same alignment precondition and selection rule as [`Self::take_full_page`].
    pub fn take_empty_page(&self) -> Page<'_> {
        let index = Self::take(&self.write, self.page_size);
        self.page(index)
    }

    /// Return both cursors to the top of page 0.
    pub fn reset(&self) {
        self.write.store(0, Ordering::Release);
        self.read.store(0, Ordering::Release);
        if let Some(ownership) = &self.ownership {
            ownership.reset();
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn write_cursor(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    pub fn read_cursor(&self) -> usize {
        self.read.load(Ordering::Acquire)
    }

    /// Number of times a cursor started on a page the control loop had not yet
    /// taken back. Always zero when ownership tracking is disabled.
    pub fn overrun_count(&self) -> u32 {
        self.ownership
            .as_ref()
            .map(|o| o.overruns.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn advance(&self, at: usize) -> usize {
        let next = at + 1;
        if next == self.bytes.len() {
            0
        } else {
            next
        }
    }

    fn track_entry(&self, at: usize) {
        if let Some(ownership) = &self.ownership {
            if at % self.page_size == 0 {
                ownership.entering(at / self.page_size);
            }
        }
    }

    fn track_hand_over(&self, at: usize) {
        if let Some(ownership) = &self.ownership {
            ownership.handed_over(at / self.page_size);
        }
    }

    fn take(cursor: &AtomicUsize, page_size: usize) -> usize {
        let (index, next) = if cursor.load(Ordering::Acquire) > 0 {
            (1, 0)
        } else {
            (0, page_size)
        };
        cursor.store(next, Ordering::Release);
        index
    }

    fn page(&self, index: usize) -> Page<'_> {
        if let Some(ownership) = &self.ownership {
            ownership.release(index);
        }
        let start = index * self.page_size;
        Page {
            index,
            bytes: &self.bytes[start..start + self.page_size],
        }
    }
}

impl<E> std::fmt::Debug for DoubleBuffer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleBuffer")
            .field("page_size", &self.page_size)
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// One page of a [`DoubleBuffer`], borrowed for a bulk transfer.
#[derive(Clone, Copy)]
pub struct Page<'a> {
    index: usize,
    bytes: &'a [AtomicU8],
}

impl Page<'_> {
    /// 0 for the lower page, 1 for the upper page.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy the page into `out`, returning the number of bytes copied.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes.len());
        for (dst, src) in out.iter_mut().zip(self.bytes) {
            *dst = src.load(Ordering::Relaxed);
        }
        n
    }

    /// Overwrite the page from `src`, returning the number of bytes copied.
    pub fn fill_from(&self, src: &[u8]) -> usize {
        let n = src.len().min(self.bytes.len());
        for (dst, byte) in self.bytes.iter().zip(src) {
            dst.store(*byte, Ordering::Relaxed);
        }
        n
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

impl std::fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSink {
        full: AtomicUsize,
        empty: AtomicUsize,
    }

    impl CountingSink {
        fn full(&self) -> usize {
            self.full.load(Ordering::Relaxed)
        }

        fn empty(&self) -> usize {
            self.empty.load(Ordering::Relaxed)
        }
    }

    impl PageEventSink for CountingSink {
        fn on_page_event(&self, event: PageEvent) {
            match event {
                PageEvent::Full => self.full.fetch_add(1, Ordering::Relaxed),
                PageEvent::Empty => self.empty.fetch_add(1, Ordering::Relaxed),
            };
        }
    }

    fn buffer(page_size: usize) -> DoubleBuffer<Arc<CountingSink>> {
        DoubleBuffer::new(page_size, Arc::new(CountingSink::default()))
    }

    #[test]
    fn write_cursor_wraps_and_fires_once_per_page() {
        for k in [0usize, 1, 7, 8, 9, 15, 16, 17, 40, 64, 65] {
            let buf = buffer(8);
            for i in 0..k {
                buf.push(i as u8);
            }
            assert_eq!(buf.write_cursor(), k % 16, "cursor after {k} pushes");
            assert_eq!(buf.events().full(), k / 8, "events after {k} pushes");
            assert_eq!(buf.events().empty(), 0);
        }
    }

    #[test]
    fn read_cursor_wraps_and_fires_once_per_page() {
        let buf = buffer(4);
        for _ in 0..19 {
            buf.pop();
        }
        assert_eq!(buf.read_cursor(), 19 % 8);
        assert_eq!(buf.events().empty(), 4);
        assert_eq!(buf.events().full(), 0);
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let buf = buffer(8);
        let input: Vec<u8> = (0..16).map(|i| (i * 13 + 5) as u8).collect();
        for &b in &input {
            buf.push(b);
        }
        let output: Vec<u8> = (0..input.len()).map(|_| buf.pop()).collect();
        assert_eq!(output, input);
    }

    #[test]
    fn take_full_page_alternates() {
        let buf = buffer(4);
        let order: Vec<usize> = (0..5).map(|_| buf.take_full_page().index()).collect();
        assert_eq!(order, vec![0, 1, 0, 1, 0]);
        assert_eq!(buf.read_cursor(), 4);
        assert_eq!(buf.events().empty(), 0);
    }

    #[test]
    fn take_full_page_from_upper_page() {
        let buf = buffer(4);
        for _ in 0..4 {
            buf.pop();
        }
        assert_eq!(buf.take_full_page().index(), 1);
        assert_eq!(buf.read_cursor(), 0);
        assert_eq!(buf.take_full_page().index(), 0);
    }

    #[test]
    fn take_empty_page_alternates_without_events() {
        let buf = buffer(4);
        assert_eq!(buf.take_empty_page().index(), 0);
        assert_eq!(buf.write_cursor(), 4);
        assert_eq!(buf.take_empty_page().index(), 1);
        assert_eq!(buf.write_cursor(), 0);
        assert_eq!(buf.events().full(), 0);
    }

    #[test]
    fn full_page_holds_pushed_bytes() {
        let buf = buffer(4);
        for b in [1u8, 2, 3, 4] {
            buf.push(b);
        }
        let page = buf.take_full_page();
        assert_eq!(page.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn filled_page_pops_in_order() {
        let buf = buffer(4);
        buf.take_empty_page().fill_from(&[9, 8, 7, 6]);
        buf.take_empty_page().fill_from(&[5, 4, 3, 2]);
        let out: Vec<u8> = (0..8).map(|_| buf.pop()).collect();
        assert_eq!(out, vec![9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[test]
    fn reset_is_idempotent() {
        let buf = buffer(4);
        for _ in 0..5 {
            buf.push(1);
        }
        buf.pop();
        buf.reset();
        let once = (buf.write_cursor(), buf.read_cursor());
        buf.reset();
        assert_eq!(once, (0, 0));
        assert_eq!((buf.write_cursor(), buf.read_cursor()), once);
    }

    #[test]
    fn overrun_counted_when_page_not_taken() {
        let buf = buffer(4).detect_overruns(true);
        // Page 0 filled and taken in time; page 1 filled but never taken.
        for _ in 0..4 {
            buf.push(0);
        }
        buf.take_full_page();
        for _ in 0..4 {
            buf.push(0);
        }
        for _ in 0..4 {
            buf.push(0);
        }
        assert_eq!(buf.overrun_count(), 0);
        // Wrapped from page 0 back into the still-held page 1.
        buf.push(0);
        assert_eq!(buf.overrun_count(), 1);
    }

    #[test]
    fn finishing_a_page_alone_is_not_an_overrun() {
        let buf = buffer(4).detect_overruns(true);
        buf.take_empty_page();
        buf.take_empty_page();
        // Drain both pages without refilling; the cursor stops at the boundary.
        for _ in 0..8 {
            buf.pop();
        }
        assert_eq!(buf.overrun_count(), 0);
    }

    #[test]
    fn serviced_pages_never_count_overruns() {
        let buf = buffer(4).detect_overruns(true);
        for _ in 0..10 {
            for _ in 0..4 {
                buf.push(0);
            }
            buf.take_full_page();
        }
        assert_eq!(buf.overrun_count(), 0);
    }

    #[test]
    fn overrun_tracking_disabled_by_default() {
        let buf = buffer(2);
        for _ in 0..20 {
            buf.push(0);
        }
        assert_eq!(buf.overrun_count(), 0);
    }

    #[test]
    fn page_copy_respects_shorter_destination() {
        let buf = buffer(4);
        let page = buf.take_empty_page();
        assert_eq!(page.fill_from(&[1, 2]), 2);
        let mut out = [0u8; 3];
        assert_eq!(page.copy_to(&mut out), 3);
        assert_eq!(out, [1, 2, crate::buffering::SILENCE]);
    }
}
