use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::analysis::{window_offsets, WINDOW_SIZE};

/// Minimum wall-clock time between two dispatched windows.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
/// Longest single sleep while pacing; bounds cancellation latency.
const POLL_SLICE: Duration = Duration::from_millis(5);

/// Shared run flag. Clearing it stops the feeder at its next check.
#[derive(Clone, Debug)]
pub struct FeederControl {
    active: Arc<AtomicBool>,
}

impl Default for FeederControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FeederControl {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn resume(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// One window handed to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowMessage {
    pub offset: usize,
    pub samples: Vec<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedEnd {
    /// Every full window was delivered.
    Exhausted { windows: usize },
    /// The run flag was cleared.
    Cancelled { windows: usize },
    /// The consumer hung up.
    Disconnected { windows: usize },
}

impl FeedEnd {
    pub fn windows(&self) -> usize {
        match *self {
            FeedEnd::Exhausted { windows }
            | FeedEnd::Cancelled { windows }
            | FeedEnd::Disconnected { windows } => windows,
        }
    }
}

/// Delivers overlapping windows of one channel at playback pace.
///
/// A run is a single pass over the channel; it never wraps around.
pub struct RealtimeFeeder {
    samples: Arc<[i32]>,
    tick: Duration,
    control: FeederControl,
}

impl RealtimeFeeder {
    pub fn new(samples: Arc<[i32]>, control: FeederControl) -> Self {
        Self {
            samples,
            tick: DEFAULT_TICK,
            control,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run the pacing loop on its own thread.
    pub fn spawn(self, tx: Sender<WindowMessage>) -> std::io::Result<JoinHandle<FeedEnd>> {
        thread::Builder::new()
            .name("realtime-feeder".into())
            .spawn(move || self.run(&tx))
    }

    pub fn run(&self, tx: &Sender<WindowMessage>) -> FeedEnd {
        if !self.control.is_active() {
            log::info!("Feeder inactive, nothing dispatched");
            return FeedEnd::Cancelled { windows: 0 };
        }

        log::info!(
            "Feeding {} samples, tick {}ms",
            self.samples.len(),
            self.tick.as_millis()
        );

        let mut windows = 0;
        for offset in window_offsets(self.samples.len()) {
            let started = Instant::now();

            if !self.control.is_active() {
                log::info!("Feeder cancelled after {} windows", windows);
                return FeedEnd::Cancelled { windows };
            }

            let message = WindowMessage {
                offset,
                samples: self.samples[offset..offset + WINDOW_SIZE].to_vec(),
            };
            if tx.send(message).is_err() {
                log::warn!("Frame consumer hung up after {} windows", windows);
                return FeedEnd::Disconnected { windows };
            }
            windows += 1;
            log::trace!("Dispatched window {} @ {}", windows, offset);

            if !self.wait_until(started + self.tick) {
                log::info!("Feeder cancelled after {} windows", windows);
                return FeedEnd::Cancelled { windows };
            }
        }

        log::info!("Feeder finished: {} windows", windows);
        FeedEnd::Exhausted { windows }
    }

    /// Sleep until `deadline`, returning false as soon as the run flag is
    /// cleared.
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if !self.control.is_active() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_SLICE));
        }
    }
}
