//! Blocking waits and cooperative shutdown.
//!
//! The capture loops never call `std::thread::sleep` directly; they go through a
//! `Sleeper` so that settle delays and backoff waits can be observed in tests and
//! cut short when the process is asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity at which `ThreadSleeper` re-checks the shutdown flag.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Shared shutdown request flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown on Ctrl-C / SIGTERM.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received, finishing current capture...");
            flag.request();
        })
    }
}

/// Blocking wait used by the capture session.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock sleeper that returns early once shutdown is requested.
#[derive(Clone, Debug)]
pub struct ThreadSleeper {
    shutdown: Shutdown,
}

impl ThreadSleeper {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.is_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
