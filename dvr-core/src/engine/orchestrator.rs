//! Control-loop state machine.
//!
//! ## Modes
//!
//! ```text
//!            record edge                       play edge
//! Recording ◄──────────── Stopped ───────────────► Playing
//!     │  page limit / stop edge (after page)  ▲        │ end of stream / stop edge
//!     └───────────────────────────────────────┴────────┘
//! ```
//!
//! Page events only set flags (they arrive in interrupt context); every
//! storage transfer happens here, one page per control-loop iteration.
//! Storage faults are logged and counted but never end a session early.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{AnalogOutput, AnalogSource, SampleConsumer, SampleProducer},
    buffering::SILENCE,
    engine::{session::PipelineState, EngineConfig},
    error::{DvrError, Result},
    input::{Buttons, EdgeDetector, UserInput},
    ipc::events::{EngineStatusEvent, Mode},
    storage::{SampleStream, Storage},
};

/// Broadcast channel capacity for status events.
const STATUS_CAP: usize = 64;

#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub page_writes: AtomicUsize,
    pub page_reads: AtomicUsize,
    pub short_transfers: AtomicUsize,
    pub storage_errors: AtomicUsize,
    pub overruns: AtomicUsize,
    pub sessions: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.page_writes.store(0, Ordering::Relaxed);
        self.page_reads.store(0, Ordering::Relaxed);
        self.short_transfers.store(0, Ordering::Relaxed);
        self.storage_errors.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.sessions.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            page_writes: self.page_writes.load(Ordering::Relaxed),
            page_reads: self.page_reads.load(Ordering::Relaxed),
            short_transfers: self.short_transfers.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub page_writes: usize,
    pub page_reads: usize,
    pub short_transfers: usize,
    pub storage_errors: usize,
    pub overruns: usize,
    pub sessions: usize,
}

/// Owns the record/playback lifecycle and all storage I/O.
pub struct StreamOrchestrator<S: Storage> {
    config: EngineConfig,
    storage: S,
    state: Arc<PipelineState>,
    stream: Option<S::Stream>,
    edges: EdgeDetector,
    /// One page of staging for storage transfers.
    scratch: Vec<u8>,
    /// Playback: pages still to be read from the stream.
    pages_to_load: u32,
    /// Playback: sample bytes still to be read from the stream.
    bytes_to_load: usize,
    overruns_seen: u32,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    seq: u64,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl<S: Storage> StreamOrchestrator<S> {
    /// Create the orchestrator and the shared pipeline state. Starts `Stopped`.
    ///
    /// # Errors
    /// `DvrError::InvalidConfig` if `config` fails validation.
    pub fn new(config: EngineConfig, storage: S) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        let state = Arc::new(PipelineState::new(&config));

        Ok(Self {
            scratch: vec![SILENCE; config.page_size],
            config,
            storage,
            state,
            stream: None,
            edges: EdgeDetector::default(),
            pages_to_load: 0,
            bytes_to_load: 0,
            overruns_seen: 0,
            status_tx,
            seq: 0,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    /// Recording driver bound to this pipeline.
    pub fn producer<A: AnalogSource>(&self, source: A) -> SampleProducer<A> {
        SampleProducer::new(source, Arc::clone(&self.state))
    }

    /// Playback driver bound to this pipeline, using the configured divisor.
    pub fn consumer<K: AnalogOutput>(&self, output: K) -> SampleConsumer<K> {
        SampleConsumer::new(
            output,
            Arc::clone(&self.state),
            self.config.effective_playback_divisor(),
        )
    }

    /// One control-loop iteration with the current (debounced) button levels.
    pub fn tick(&mut self, levels: Buttons) {
        let edges = self.edges.rising(levels);

        match self.state.flags.mode() {
            Some(Mode::Stopped) => self.tick_stopped(edges),
            Some(Mode::Recording) => self.tick_recording(edges),
            Some(Mode::Playing) => self.tick_playing(edges),
            None => {
                error!("state machine entered an invalid state; returning to stopped");
                self.abort("invalid state");
            }
        }

        self.report_overruns();
    }

    /// Poll `input` and tick until `running` is cleared, then end any session.
    pub fn run(&mut self, input: &mut impl UserInput, running: &AtomicBool, poll: Duration) {
        info!("control loop started");
        while running.load(Ordering::Relaxed) {
            let levels = input.sample();
            self.tick(levels);
            std::thread::sleep(poll);
        }
        self.shutdown();
        info!("control loop stopped");
    }

    /// End any active session immediately. A recording is finalized with
    /// whatever pages have already been written.
    pub fn shutdown(&mut self) {
        if self.mode() != Some(Mode::Stopped) {
            self.abort("shutdown");
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.state.flags.mode()
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> &Arc<PipelineDiagnostics> {
        &self.diagnostics
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Stopped ──────────────────────────────────────────────────────────────

    fn tick_stopped(&mut self, edges: Buttons) {
        if edges.contains(Buttons::PLAY) {
            self.start_playback();
        } else if edges.contains(Buttons::RECORD) {
            self.start_recording();
        }
    }

    // ── Recording ────────────────────────────────────────────────────────────

    fn start_recording(&mut self) {
        let flags = Arc::clone(&self.state.flags);
        self.state.buffer.reset();
        flags.begin(self.config.max_record_pages);

        let format = self.config.wave_format();
        match self.storage.create_stream(&self.config.stream_name, format) {
            Ok(stream) => self.stream = Some(stream),
            Err(e) => {
                self.storage_fault("create", &e);
                self.set_mode(Mode::Stopped, Some(format!("cannot create stream: {e}")));
                return;
            }
        }

        self.diagnostics.sessions.fetch_add(1, Ordering::Relaxed);
        info!(
            stream = %self.config.stream_name,
            max_pages = self.config.max_record_pages,
            "recording started"
        );
        self.set_mode(Mode::Recording, None);
        flags.set_sampling(true);
    }

    fn tick_recording(&mut self, edges: Buttons) {
        let flags = Arc::clone(&self.state.flags);

        if edges.contains(Buttons::STOP) {
            info!("stop requested; finishing current page");
            flags.finish_after_current_page();
        }

        if flags.take_pending() {
            self.drain_page();
        } else if flags.take_complete() {
            self.drain_page();
            flags.set_sampling(false);
            let samples = self.close_stream();
            info!(samples, "recording complete");
            self.set_mode(Mode::Stopped, Some(format!("recorded {samples} samples")));
        }
    }

    /// Write the page at the read cursor to the stream.
    fn drain_page(&mut self) {
        let index = {
            let page = self.state.buffer.take_full_page();
            page.copy_to(&mut self.scratch);
            page.index()
        };
        self.diagnostics.page_writes.fetch_add(1, Ordering::Relaxed);

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match stream.write_bytes(&self.scratch) {
            Ok(n) if n < self.scratch.len() => {
                warn!(page = index, wrote = n, of = self.scratch.len(), "short page write");
                self.diagnostics
                    .short_transfers
                    .fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => debug!(page = index, "page written"),
            Err(e) => self.storage_fault("write", &e),
        }
    }

    // ── Playing ──────────────────────────────────────────────────────────────

    fn start_playback(&mut self) {
        let flags = Arc::clone(&self.state.flags);
        self.state.buffer.reset();

        let stream = match self.storage.open_stream(&self.config.stream_name) {
            Ok(stream) => stream,
            Err(DvrError::InvalidHeader(reason)) => {
                warn!(reason, "stream header unreadable; treating stream as empty");
                self.set_mode(Mode::Stopped, Some("nothing to play".into()));
                return;
            }
            Err(e) => {
                self.storage_fault("open", &e);
                self.set_mode(Mode::Stopped, Some(format!("cannot open stream: {e}")));
                return;
            }
        };

        let samples = stream.sample_count() as usize;
        let total_pages = samples.div_ceil(self.config.page_size) as u32;
        if total_pages == 0 {
            warn!(stream = %self.config.stream_name, "stream holds no samples");
            if let Err(e) = stream.close() {
                self.storage_fault("close", &e);
            }
            self.set_mode(Mode::Stopped, Some("nothing to play".into()));
            return;
        }

        self.stream = Some(stream);
        self.bytes_to_load = samples;
        self.pages_to_load = total_pages;
        flags.begin(total_pages);

        // Prime both pages (or the only one) before the first sample is emitted.
        for _ in 0..total_pages.min(2) {
            self.fill_page();
        }

        self.diagnostics.sessions.fetch_add(1, Ordering::Relaxed);
        info!(samples, pages = total_pages, "playback started");
        self.set_mode(Mode::Playing, None);
        flags.set_output(true);
    }

    fn tick_playing(&mut self, edges: Buttons) {
        let flags = Arc::clone(&self.state.flags);

        if edges.contains(Buttons::STOP) {
            self.finish_playback("stopped");
        } else if flags.take_complete() {
            self.finish_playback("end of stream");
        } else if flags.take_pending() && self.pages_to_load > 0 {
            self.fill_page();
        }
    }

    /// Read the next page of the stream into the page at the write cursor.
    /// Whatever the stream does not deliver is padded with silence.
    fn fill_page(&mut self) {
        let want = self.bytes_to_load.min(self.config.page_size);
        let result = match self.stream.as_mut() {
            Some(stream) => stream.read_bytes(&mut self.scratch[..want]),
            None => Ok(0),
        };
        let got = match result {
            Ok(n) => n,
            Err(e) => {
                self.storage_fault("read", &e);
                0
            }
        };
        if got < want {
            warn!(read = got, of = want, "short page read; padding with silence");
            self.diagnostics
                .short_transfers
                .fetch_add(1, Ordering::Relaxed);
        }
        self.scratch[got..].fill(SILENCE);

        let index = {
            let page = self.state.buffer.take_empty_page();
            page.fill_from(&self.scratch);
            page.index()
        };
        debug!(page = index, bytes = want, "page loaded");

        self.bytes_to_load -= want;
        self.pages_to_load = self.pages_to_load.saturating_sub(1);
        self.diagnostics.page_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_playback(&mut self, reason: &str) {
        self.state.flags.set_output(false);
        self.close_stream();
        self.pages_to_load = 0;
        self.bytes_to_load = 0;
        info!(reason, "playback finished");
        self.set_mode(Mode::Stopped, Some(reason.to_string()));
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Force `Stopped` from any state: both drivers off, stream closed.
    fn abort(&mut self, reason: &str) {
        warn!(reason, "forcing stop");
        self.state.flags.set_sampling(false);
        self.state.flags.set_output(false);
        self.state.flags.begin(0);
        self.close_stream();
        self.pages_to_load = 0;
        self.bytes_to_load = 0;
        self.set_mode(Mode::Stopped, Some(reason.to_string()));
    }

    /// Close the open stream (finalizing created ones). Returns its sample count.
    fn close_stream(&mut self) -> u32 {
        let Some(stream) = self.stream.take() else {
            return 0;
        };
        let samples = stream.sample_count();
        if let Err(e) = stream.close() {
            self.storage_fault("close", &e);
        }
        samples
    }

    fn storage_fault(&self, op: &'static str, err: &DvrError) {
        error!(op, "storage fault: {err}");
        self.diagnostics
            .storage_errors
            .fetch_add(1, Ordering::Relaxed);
    }

    fn report_overruns(&mut self) {
        let total = self.state.buffer.overrun_count();
        if total > self.overruns_seen {
            warn!(
                new = total - self.overruns_seen,
                total,
                "page serviced too late; buffered audio was overwritten"
            );
            self.overruns_seen = total;
            self.diagnostics
                .overruns
                .store(total as usize, Ordering::Relaxed);
        }
    }

    fn set_mode(&mut self, mode: Mode, detail: Option<String>) {
        self.state.flags.set_mode(mode);
        self.seq = self.seq.wrapping_add(1);
        let _ = self.status_tx.send(EngineStatusEvent {
            seq: self.seq,
            mode,
            detail,
        });
    }
}

impl<S: Storage> Drop for StreamOrchestrator<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
