//! Record and playback sessions driven tick by tick against in-memory storage.

use std::io::Cursor;

use dvr_core::audio::signal::{CaptureOutput, RampSource};
use dvr_core::buffering::SILENCE;
use dvr_core::storage::wave::{WaveFormat, WaveHeader, HEADER_LEN};
use dvr_core::{
    Buttons, DvrError, EngineConfig, MemoryStorage, Mode, SampleStream, Storage,
    StreamOrchestrator, TickDriver,
};
use tokio::sync::broadcast::error::TryRecvError;

const PAGE: usize = 8;
const STREAM: &str = "EGB240.WAV";

struct Rig<S: Storage> {
    orch: StreamOrchestrator<S>,
    driver: TickDriver<RampSource, CaptureOutput>,
    capture: CaptureOutput,
}

impl<S: Storage> Rig<S> {
    fn new(storage: S, max_record_pages: u32) -> Self {
        let config = EngineConfig {
            page_size: PAGE,
            max_record_pages,
            detect_overruns: true,
            ..EngineConfig::default()
        };
        let orch = StreamOrchestrator::new(config.clone(), storage).unwrap();
        let capture = CaptureOutput::default();
        let driver = TickDriver::new(
            orch.producer(RampSource::default()),
            orch.consumer(capture.clone()),
            &config,
        );
        Self {
            orch,
            driver,
            capture,
        }
    }

    /// Press and release one button.
    fn press(&mut self, button: Buttons) {
        self.orch.tick(button);
        self.orch.tick(Buttons::NONE);
    }

    /// One timer tick followed by one control-loop pass, until stopped.
    fn run_until_stopped(&mut self, max_ticks: usize) -> usize {
        for n in 0..max_ticks {
            if self.orch.mode() == Some(Mode::Stopped) {
                return n;
            }
            self.driver.tick();
            self.orch.tick(Buttons::NONE);
        }
        panic!("session still active after {max_ticks} ticks");
    }
}

fn stored_stream(samples: &[u8]) -> Vec<u8> {
    let header = WaveHeader::finalized(WaveFormat::mono_u8(15_625), samples.len() as u32);
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(samples);
    bytes
}

#[test]
fn recording_stops_at_page_limit() {
    let storage = MemoryStorage::new();
    let mut rig = Rig::new(storage.clone(), 2);

    rig.press(Buttons::RECORD);
    assert_eq!(rig.orch.mode(), Some(Mode::Recording));
    rig.run_until_stopped(1_000);

    let diag = rig.orch.diagnostics_snapshot();
    assert_eq!(diag.page_writes, 2);
    assert_eq!(diag.storage_errors, 0);
    assert_eq!(diag.overruns, 0);
    assert_eq!(rig.driver.producer().source().starts(), 1);

    let bytes = storage.get(STREAM).expect("stream committed");
    assert_eq!(bytes.len(), HEADER_LEN + 2 * PAGE);
    let expected: Vec<u8> = (0..2 * PAGE as u8).collect();
    assert_eq!(&bytes[HEADER_LEN..], expected.as_slice());

    let reader = hound::WavReader::new(Cursor::new(bytes)).expect("valid WAVE");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().bits_per_sample, 8);
    assert_eq!(reader.spec().sample_rate, 15_625);
    assert_eq!(reader.duration(), 2 * PAGE as u32);
}

#[test]
fn stop_mid_page_still_flushes_that_page() {
    let storage = MemoryStorage::new();
    let mut rig = Rig::new(storage.clone(), 305);

    rig.press(Buttons::RECORD);
    // 11 samples: page 0 complete, 3 bytes into page 1.
    for _ in 0..22 {
        rig.driver.tick();
        rig.orch.tick(Buttons::NONE);
    }
    assert_eq!(rig.orch.state().buffer.write_cursor(), 11);
    assert_eq!(rig.orch.diagnostics_snapshot().page_writes, 1);

    rig.orch.tick(Buttons::STOP);
    assert_eq!(rig.orch.mode(), Some(Mode::Recording));
    rig.run_until_stopped(1_000);

    assert_eq!(rig.orch.diagnostics_snapshot().page_writes, 2);
    let bytes = storage.get(STREAM).unwrap();
    let header = WaveHeader::parse(bytes[..HEADER_LEN].try_into().unwrap()).unwrap();
    assert_eq!(header.sample_count(), 2 * PAGE as u32);
}

#[test]
fn playback_of_one_and_a_half_pages_reads_twice() {
    let storage = MemoryStorage::new();
    let samples: Vec<u8> = (10..22).collect();
    storage.insert(STREAM, stored_stream(&samples));
    let mut rig = Rig::new(storage, 305);

    rig.press(Buttons::PLAY);
    assert_eq!(rig.orch.mode(), Some(Mode::Playing));
    assert_eq!(rig.orch.diagnostics_snapshot().page_reads, 2);
    rig.run_until_stopped(1_000);

    let diag = rig.orch.diagnostics_snapshot();
    assert_eq!(diag.page_reads, 2);
    assert_eq!(diag.short_transfers, 0);
    assert_eq!(diag.overruns, 0);

    // Two full pages are emitted; the tail of the second is silence.
    let mut expected = samples.clone();
    expected.resize(2 * PAGE, SILENCE);
    assert_eq!(rig.capture.samples(), expected);
}

#[test]
fn longer_playback_refills_pages_in_order() {
    let storage = MemoryStorage::new();
    let samples: Vec<u8> = (0..5 * PAGE as u8).map(|s| s.wrapping_mul(3)).collect();
    storage.insert(STREAM, stored_stream(&samples));
    let mut rig = Rig::new(storage, 305);

    rig.press(Buttons::PLAY);
    rig.run_until_stopped(10_000);

    assert_eq!(rig.orch.diagnostics_snapshot().page_reads, 5);
    assert_eq!(rig.capture.samples(), samples);
}

#[test]
fn stop_during_playback_is_immediate() {
    let storage = MemoryStorage::new();
    storage.insert(STREAM, stored_stream(&[42; 4 * PAGE]));
    let mut rig = Rig::new(storage, 305);

    rig.press(Buttons::PLAY);
    for _ in 0..6 {
        rig.driver.tick();
        rig.orch.tick(Buttons::NONE);
    }
    rig.orch.tick(Buttons::STOP);
    assert_eq!(rig.orch.mode(), Some(Mode::Stopped));
    assert!(!rig.orch.state().flags.output_enabled());

    let emitted = rig.capture.samples().len();
    rig.driver.advance(100);
    assert_eq!(rig.capture.samples().len(), emitted);
}

#[test]
fn recorded_stream_plays_back_verbatim() {
    let storage = MemoryStorage::new();
    let mut rig = Rig::new(storage, 3);

    rig.press(Buttons::RECORD);
    rig.run_until_stopped(1_000);
    rig.press(Buttons::PLAY);
    assert_eq!(rig.orch.mode(), Some(Mode::Playing));
    rig.run_until_stopped(1_000);

    let expected: Vec<u8> = (0..3 * PAGE as u8).collect();
    assert_eq!(rig.capture.samples(), expected);
    assert_eq!(rig.orch.diagnostics_snapshot().sessions, 2);
}

#[test]
fn late_control_loop_is_reported_as_overrun() {
    let mut rig = Rig::new(MemoryStorage::new(), 305);
    rig.press(Buttons::RECORD);

    // Three pages of samples without servicing the control loop.
    rig.driver.advance(2 * 3 * PAGE);
    rig.orch.tick(Buttons::NONE);

    assert!(rig.orch.diagnostics_snapshot().overruns >= 1);
    rig.orch.shutdown();
}

#[test]
fn play_with_no_stream_stays_stopped() {
    let mut rig = Rig::new(MemoryStorage::new(), 305);
    let mut status = rig.orch.subscribe_status();

    rig.press(Buttons::PLAY);

    assert_eq!(rig.orch.mode(), Some(Mode::Stopped));
    let event = status.try_recv().unwrap();
    assert_eq!(event.mode, Mode::Stopped);
    assert!(event.detail.unwrap().contains("cannot open"));
}

#[test]
fn empty_stream_is_not_played() {
    let storage = MemoryStorage::new();
    storage.insert(STREAM, stored_stream(&[]));
    let mut rig = Rig::new(storage, 305);

    rig.press(Buttons::PLAY);
    assert_eq!(rig.orch.mode(), Some(Mode::Stopped));
    assert_eq!(rig.orch.diagnostics_snapshot().page_reads, 0);
}

#[test]
fn status_events_trace_a_full_session() {
    let mut rig = Rig::new(MemoryStorage::new(), 1);
    let mut status = rig.orch.subscribe_status();

    rig.press(Buttons::RECORD);
    rig.run_until_stopped(1_000);

    let modes: Vec<Mode> = std::iter::from_fn(|| status.try_recv().ok())
        .map(|e| e.mode)
        .collect();
    assert_eq!(modes, vec![Mode::Recording, Mode::Stopped]);
    assert!(matches!(status.try_recv(), Err(TryRecvError::Empty)));
}

// ── Storage faults ───────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Fault {
    WriteError,
    ShortWrite,
    ShortRead,
}

struct FaultyStorage {
    inner: MemoryStorage,
    fault: Fault,
}

struct FaultyStream {
    inner: <MemoryStorage as Storage>::Stream,
    fault: Fault,
}

impl Storage for FaultyStorage {
    type Stream = FaultyStream;

    fn create_stream(
        &mut self,
        name: &str,
        format: WaveFormat,
    ) -> dvr_core::Result<Self::Stream> {
        Ok(FaultyStream {
            inner: self.inner.create_stream(name, format)?,
            fault: self.fault,
        })
    }

    fn open_stream(&mut self, name: &str) -> dvr_core::Result<Self::Stream> {
        Ok(FaultyStream {
            inner: self.inner.open_stream(name)?,
            fault: self.fault,
        })
    }
}

impl SampleStream for FaultyStream {
    fn read_bytes(&mut self, buf: &mut [u8]) -> dvr_core::Result<usize> {
        match self.fault {
            Fault::ShortRead => {
                let half = buf.len() / 2;
                self.inner.read_bytes(&mut buf[..half])
            }
            _ => self.inner.read_bytes(buf),
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> dvr_core::Result<usize> {
        match self.fault {
            Fault::WriteError => Err(DvrError::Io(std::io::Error::other("card removed"))),
            Fault::ShortWrite => self.inner.write_bytes(&buf[..buf.len() / 2]),
            Fault::ShortRead => self.inner.write_bytes(buf),
        }
    }

    fn sample_count(&self) -> u32 {
        self.inner.sample_count()
    }

    fn close(self) -> dvr_core::Result<()> {
        self.inner.close()
    }
}

#[test]
fn write_errors_do_not_end_recording_early() {
    let memory = MemoryStorage::new();
    let storage = FaultyStorage {
        inner: memory.clone(),
        fault: Fault::WriteError,
    };
    let mut rig = Rig::new(storage, 3);

    rig.press(Buttons::RECORD);
    let ticks = rig.run_until_stopped(1_000);

    // Three pages at one sample every two ticks.
    assert!(ticks >= 2 * 3 * PAGE);
    let diag = rig.orch.diagnostics_snapshot();
    assert_eq!(diag.page_writes, 3);
    assert_eq!(diag.storage_errors, 3);

    let bytes = memory.get(STREAM).expect("stream still finalized");
    assert_eq!(bytes.len(), HEADER_LEN);
}

#[test]
fn short_writes_are_counted() {
    let memory = MemoryStorage::new();
    let storage = FaultyStorage {
        inner: memory.clone(),
        fault: Fault::ShortWrite,
    };
    let mut rig = Rig::new(storage, 2);

    rig.press(Buttons::RECORD);
    rig.run_until_stopped(1_000);

    let diag = rig.orch.diagnostics_snapshot();
    assert_eq!(diag.short_transfers, 2);
    assert_eq!(diag.storage_errors, 0);
    assert_eq!(memory.get(STREAM).unwrap().len(), HEADER_LEN + PAGE);
}

#[test]
fn short_reads_are_padded_with_silence() {
    let memory = MemoryStorage::new();
    memory.insert(STREAM, stored_stream(&[7; 2 * PAGE]));
    let storage = FaultyStorage {
        inner: memory,
        fault: Fault::ShortRead,
    };
    let mut rig = Rig::new(storage, 305);

    rig.press(Buttons::PLAY);
    rig.run_until_stopped(1_000);

    let mut page = vec![7; PAGE / 2];
    page.resize(PAGE, SILENCE);
    let expected = [page.clone(), page].concat();
    assert_eq!(rig.capture.samples(), expected);
    assert_eq!(rig.orch.diagnostics_snapshot().short_transfers, 2);
}

#[test]
fn unreadable_header_is_treated_as_empty() {
    let storage = MemoryStorage::new();
    storage.insert(STREAM, b"not a wave file at all, just some bytes......".to_vec());
    let mut rig = Rig::new(storage, 305);
    let mut status = rig.orch.subscribe_status();

    rig.press(Buttons::PLAY);

    assert_eq!(rig.orch.mode(), Some(Mode::Stopped));
    assert_eq!(rig.orch.diagnostics_snapshot().storage_errors, 0);
    let event = status.try_recv().unwrap();
    assert_eq!(event.detail.as_deref(), Some("nothing to play"));
}
