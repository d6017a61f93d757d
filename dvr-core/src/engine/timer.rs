//! Host stand-in for the device's timer interrupts.
//!
//! One timing source at `output_tick_hz` drives both sample drivers: the
//! consumer sees every tick (it applies its own divisor), the producer every
//! `sampling_prescaler` ticks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::audio::{AnalogOutput, AnalogSource, SampleConsumer, SampleProducer};
use crate::engine::EngineConfig;

/// Sleep between catch-up bursts when the tick thread is ahead of the clock.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct TickDriver<A, K> {
    producer: SampleProducer<A>,
    consumer: SampleConsumer<K>,
    prescaler: u32,
    phase: u32,
    tick_hz: u32,
    ticks: u64,
}

impl<A: AnalogSource, K: AnalogOutput> TickDriver<A, K> {
    pub fn new(
        producer: SampleProducer<A>,
        consumer: SampleConsumer<K>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            producer,
            consumer,
            prescaler: config.sampling_prescaler(),
            phase: 0,
            tick_hz: config.output_tick_hz.max(1),
            ticks: 0,
        }
    }

    /// One timing-source tick.
    pub fn tick(&mut self) {
        self.phase += 1;
        if self.phase >= self.prescaler {
            self.phase = 0;
            self.producer.tick();
        }
        self.consumer.tick();
        self.ticks += 1;
    }

    /// Run `n` ticks back to back.
    pub fn advance(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn producer(&self) -> &SampleProducer<A> {
        &self.producer
    }

    pub fn consumer(&self) -> &SampleConsumer<K> {
        &self.consumer
    }

    /// Tick in real time on a dedicated thread until `running` is cleared.
    ///
    /// Pacing follows the wall clock: the thread catches up on all ticks due
    /// since it started, then sleeps briefly.
    pub fn spawn(mut self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>>
    where
        A: 'static,
        K: 'static,
    {
        std::thread::Builder::new()
            .name("dvr-tick".into())
            .spawn(move || {
                info!(tick_hz = self.tick_hz, prescaler = self.prescaler, "tick thread started");
                let started = Instant::now();
                while running.load(Ordering::Relaxed) {
                    let due = started.elapsed().as_secs_f64() * f64::from(self.tick_hz);
                    let due = due as u64;
                    while self.ticks < due {
                        self.tick();
                    }
                    std::thread::sleep(IDLE_SLEEP);
                }
                debug!(ticks = self.ticks, "tick thread exiting");
            })
    }
}
