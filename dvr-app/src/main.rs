//! dvr host application entry point.
//!
//! ## Threads
//!
//! - `dvr-tick`: the timer stand-in driving both sample drivers.
//! - control loop: `StreamOrchestrator::run` inside `spawn_blocking`.
//! - `dvr-stdin`: maps `r` / `p` / `s` lines to button presses.
//! - Tokio tasks: status printer and Ctrl-C handler.

mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::Sender;
use dvr_core::{
    audio::signal::{NullOutput, SilenceSource, SineSource},
    AnalogOutput, AnalogSource, Button, ChannelInput, DirStorage, StreamOrchestrator, TickDriver,
};
use settings::{default_settings_path, load_settings, AppSettings};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Keeps host audio streams alive for the lifetime of `main`.
#[cfg(feature = "audio-cpal")]
type HostStreams = Vec<dvr_core::audio::host::HostStream>;
#[cfg(not(feature = "audio-cpal"))]
type HostStreams = ();

fn open_source(
    settings: &AppSettings,
    _streams: &mut HostStreams,
) -> anyhow::Result<Box<dyn AnalogSource>> {
    match settings.source.as_str() {
        "silence" => Ok(Box::new(SilenceSource)),
        "host" => {
            #[cfg(feature = "audio-cpal")]
            {
                let (stream, source) =
                    dvr_core::audio::host::open_host_input(settings.engine.sample_rate)?;
                _streams.push(stream);
                Ok(Box::new(source))
            }
            #[cfg(not(feature = "audio-cpal"))]
            {
                warn!("built without audio-cpal; using the test tone as input");
                Ok(Box::new(SineSource::new(
                    settings.tone_hz,
                    settings.engine.sample_rate,
                    0.8,
                )))
            }
        }
        _ => Ok(Box::new(SineSource::new(
            settings.tone_hz,
            settings.engine.sample_rate,
            0.8,
        ))),
    }
}

fn open_output(
    settings: &AppSettings,
    _streams: &mut HostStreams,
) -> anyhow::Result<Box<dyn AnalogOutput>> {
    match settings.output.as_str() {
        "host" => {
            #[cfg(feature = "audio-cpal")]
            {
                let (stream, output) =
                    dvr_core::audio::host::open_host_output(settings.engine.sample_rate)?;
                _streams.push(stream);
                Ok(Box::new(output))
            }
            #[cfg(not(feature = "audio-cpal"))]
            {
                warn!("built without audio-cpal; discarding playback output");
                Ok(Box::new(NullOutput))
            }
        }
        _ => Ok(Box::new(NullOutput)),
    }
}

/// Read button commands from stdin until `q` or end of input.
fn spawn_stdin_reader(tx: Sender<Button>, running: Arc<AtomicBool>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("dvr-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let button = match line.trim().to_ascii_lowercase().as_str() {
                    "r" | "rec" | "record" => Button::Record,
                    "p" | "play" => Button::Play,
                    "s" | "stop" => Button::Stop,
                    "q" | "quit" => break,
                    "" => continue,
                    other => {
                        warn!("unknown command '{other}' (r = record, p = play, s = stop, q = quit)");
                        continue;
                    }
                };
                if tx.send(button).is_err() {
                    break;
                }
            }
            running.store(false, Ordering::Relaxed);
        })?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    info!(
        settings = %settings_path.display(),
        storage = %settings.storage_dir.display(),
        source = %settings.source,
        output = %settings.output,
        "dvr starting"
    );

    let storage = DirStorage::new(&settings.storage_dir)
        .with_context(|| format!("opening {}", settings.storage_dir.display()))?;
    let mut orchestrator = StreamOrchestrator::new(settings.engine.clone(), storage)?;

    // ── Status printer ────────────────────────────────────────────────────
    let mut status_rx = orchestrator.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{json}"),
                    Err(e) => warn!("serialize status: {e}"),
                },
                Err(RecvError::Lagged(n)) => warn!("status receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── Tick thread ───────────────────────────────────────────────────────
    #[allow(clippy::let_unit_value)]
    let mut host_streams = HostStreams::default();
    let source = open_source(&settings, &mut host_streams)?;
    let output = open_output(&settings, &mut host_streams)?;
    let driver = TickDriver::new(
        orchestrator.producer(source),
        orchestrator.consumer(output),
        &settings.engine,
    );

    let running = Arc::new(AtomicBool::new(true));
    let tick_thread = driver
        .spawn(Arc::clone(&running))
        .context("spawning tick thread")?;

    // ── Input ─────────────────────────────────────────────────────────────
    let (button_tx, button_rx) = crossbeam_channel::unbounded();
    spawn_stdin_reader(button_tx, Arc::clone(&running)).context("spawning stdin reader")?;
    println!("commands: r = record, p = play, s = stop, q = quit");

    let ctrlc_running = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            ctrlc_running.store(false, Ordering::Relaxed);
        }
    });

    // ── Control loop ──────────────────────────────────────────────────────
    let poll = Duration::from_millis(settings.poll_interval_ms);
    let loop_running = Arc::clone(&running);
    let diagnostics = tokio::task::spawn_blocking(move || {
        let mut input = ChannelInput::new(button_rx);
        orchestrator.run(&mut input, &loop_running, poll);
        orchestrator.diagnostics_snapshot()
    })
    .await
    .context("control loop panicked")?;

    running.store(false, Ordering::Relaxed);
    if tick_thread.join().is_err() {
        warn!("tick thread panicked");
    }
    drop(host_streams);

    info!(
        sessions = diagnostics.sessions,
        page_writes = diagnostics.page_writes,
        page_reads = diagnostics.page_reads,
        short_transfers = diagnostics.short_transfers,
        storage_errors = diagnostics.storage_errors,
        overruns = diagnostics.overruns,
        "dvr stopped"
    );
    Ok(())
}
