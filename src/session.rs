//! Capture session: keeps one camera stream alive and saves one frame per interval.
//!
//! State machine:
//!
//! ```text
//!   DISCONNECTED --open ok--> CONNECTED_IDLE --capture ok--> CONNECTED_IDLE
//!        ^                         |
//!        +------- release ---------+      restart = backoff wait, release, settle, open
//! ```
//!
//! Modes:
//! - continuous: open once, capture every interval, restart only after a failure
//! - intermittent: fresh connection for every capture, released right after it
//! - snapshot: one intermittent cycle, retried until success or the abort threshold
//!
//! All failures inside a capture are recoverable (`CaptureFailure`). The only
//! fatal outcome is a snapshot that exhausts its attempts (`SnapshotOutcome::Aborted`).
//! The session is single-threaded; every wait goes through its `Sleeper`.

use std::time::Duration;

use crate::backoff::next_backoff;
use crate::cameras::ConnectionTarget;
use crate::frame::Frame;
use crate::ingest::{FrameStream, StreamSource};
use crate::pace::{Shutdown, Sleeper};
use crate::sink::FrameSink;

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_FLUSH_SETTLE: Duration = Duration::from_secs(1);
pub const DEFAULT_RESTART_SETTLE: Duration = Duration::from_secs(10);
pub const DEFAULT_SNAPSHOT_ABORT_THRESHOLD: u32 = 5;

/// Timing and retry knobs for a capture session. Immutable once the session exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Target spacing between successful captures.
    pub interval: Duration,
    /// Frames to discard after connecting, for cameras that serve stale buffers first.
    pub flush_frames: u32,
    /// Wait before and after flushing.
    pub flush_settle: Duration,
    /// Wait between releasing and reopening the stream.
    pub restart_settle: Duration,
    /// Consecutive failed attempts after which a snapshot gives up.
    pub snapshot_abort_threshold: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            flush_frames: 0,
            flush_settle: DEFAULT_FLUSH_SETTLE,
            restart_settle: DEFAULT_RESTART_SETTLE,
            snapshot_abort_threshold: DEFAULT_SNAPSHOT_ABORT_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureMode {
    /// Keep the stream open across captures.
    Continuous,
    /// Reconnect for every capture.
    Intermittent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ConnectedIdle,
}

/// Why a capture attempt produced no frame. Every variant is recoverable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureFailure {
    /// No stream is open (the last open failed).
    NotConnected,
    /// The stream was open but no frame could be read.
    CannotRead(String),
    /// The frame matched the previous one byte for byte: the stream is stuck.
    IdenticalFrames,
    /// The sink could not store the frame.
    WriteFailed(String),
}

impl std::fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureFailure::NotConnected => write!(f, "stream not connected"),
            CaptureFailure::CannotRead(reason) => write!(f, "cannot read frame: {}", reason),
            CaptureFailure::IdenticalFrames => write!(f, "identical consecutive frames"),
            CaptureFailure::WriteFailed(reason) => write!(f, "cannot store frame: {}", reason),
        }
    }
}

impl std::error::Error for CaptureFailure {}

/// Result of `snapshot_capture`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Captured,
    /// Gave up after `attempts` consecutive failures. No frame was stored.
    Aborted { attempts: u32 },
    /// Shutdown was requested before a frame was stored.
    Interrupted,
}

pub struct CaptureSession<S: StreamSource, K: FrameSink, P: Sleeper> {
    target: ConnectionTarget,
    source: S,
    stream: Option<S::Stream>,
    sink: K,
    sleeper: P,
    settings: CaptureSettings,
    shutdown: Shutdown,
    consecutive_failures: u32,
    backoff_secs: u64,
    last_frame: Option<Frame>,
    frames_captured: u64,
}

impl<S: StreamSource, K: FrameSink, P: Sleeper> CaptureSession<S, K, P> {
    pub fn new(
        target: ConnectionTarget,
        source: S,
        sink: K,
        settings: CaptureSettings,
        sleeper: P,
    ) -> Self {
        Self {
            target,
            source,
            stream: None,
            sink,
            sleeper,
            settings,
            shutdown: Shutdown::new(),
            consecutive_failures: 0,
            backoff_secs: 0,
            last_frame: None,
            frames_captured: 0,
        }
    }

    /// Stop the mode loops when `shutdown` is requested.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        if self.stream.is_some() {
            SessionState::ConnectedIdle
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff_seconds(&self) -> u64 {
        self.backoff_secs
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Open the stream. Failure leaves the session disconnected and is only logged.
    pub fn open(&mut self) -> bool {
        self.release();
        self.last_frame = None;

        match self.source.open(&self.target) {
            Ok(stream) if stream.is_open() => {
                log::debug!("Opening capture successful: {}", self.target);
                self.stream = Some(stream);
                true
            }
            Ok(mut stream) => {
                stream.close();
                log::error!("Error opening stream {}: stream not open", self.target);
                false
            }
            Err(err) => {
                log::error!("Error opening stream {}: {:#}", self.target, err);
                false
            }
        }
    }

    /// Release the stream if one is open. Never fails.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            log::debug!("Releasing capture successful");
        }
    }

    /// Backoff wait (if due), release, settle, open. The single recovery path.
    pub fn restart(&mut self) -> bool {
        self.backoff_secs = next_backoff(self.consecutive_failures, self.backoff_secs);
        if self.backoff_secs > 0 {
            log::info!(
                "{} consecutive failed captures. Waiting {} seconds",
                self.consecutive_failures,
                self.backoff_secs
            );
            self.sleeper.sleep(Duration::from_secs(self.backoff_secs));
        }

        self.release();
        self.sleeper.sleep(self.settings.restart_settle);
        if self.shutdown.is_requested() {
            return false;
        }
        self.open()
    }

    /// One capture attempt on the current stream.
    ///
    /// Success stores the frame and resets the failure counters; any failure
    /// increments them. The caller decides whether to restart.
    pub fn capture(&mut self) -> Result<(), CaptureFailure> {
        let result = self.try_capture();
        match &result {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.backoff_secs = 0;
                self.frames_captured += 1;
            }
            Err(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }
        result
    }

    fn try_capture(&mut self) -> Result<(), CaptureFailure> {
        let Some(stream) = self.stream.as_mut() else {
            log::warn!("capture skipped: stream {} not connected", self.target);
            return Err(CaptureFailure::NotConnected);
        };

        let flush_frames = self.settings.flush_frames;
        if flush_frames > 0 {
            self.sleeper.sleep(self.settings.flush_settle);
            for i in 0..flush_frames {
                if !stream.discard_next_frame() {
                    log::debug!("Flushing error {} / {}", i + 1, flush_frames);
                }
            }
            self.sleeper.sleep(self.settings.flush_settle);
        }

        let frame = stream.read_frame().map_err(|err| {
            log::error!("Image capturing error: {:#}", err);
            CaptureFailure::CannotRead(format!("{:#}", err))
        })?;

        if let Some(last) = &self.last_frame {
            if last.is_identical_to(&frame) {
                log::error!("Captured frame is identical to previous frame");
                return Err(CaptureFailure::IdenticalFrames);
            }
        }

        let frame = self.last_frame.insert(frame);
        self.sink.write(frame).map_err(|err| {
            log::error!("Failed to store frame: {:#}", err);
            CaptureFailure::WriteFailed(format!("{:#}", err))
        })
    }

    /// Run `mode` until shutdown is requested. The stream is released on return.
    pub fn start_capture(&mut self, mode: CaptureMode) {
        log::info!(
            "starting {:?} capture from {} every {}s (flush {} frames)",
            mode,
            self.target,
            self.settings.interval.as_secs(),
            self.settings.flush_frames
        );
        match mode {
            CaptureMode::Continuous => self.run_continuous(),
            CaptureMode::Intermittent => self.run_intermittent(),
        }
        log::info!(
            "capture stopped after {} frames from {}",
            self.frames_captured,
            self.target
        );
    }

    fn run_continuous(&mut self) {
        self.open();
        while !self.shutdown.is_requested() {
            match self.capture() {
                Ok(()) => self.sleeper.sleep(self.settings.interval),
                Err(failure) => {
                    log::warn!("continuous capture failed ({}), restarting", failure);
                    self.restart();
                }
            }
        }
        self.release();
    }

    fn run_intermittent(&mut self) {
        while !self.shutdown.is_requested() {
            self.restart();
            if self.shutdown.is_requested() {
                break;
            }
            if let Err(failure) = self.capture() {
                log::warn!("intermittent capture failed: {}", failure);
            }
            self.release();
            self.sleeper.sleep(self.settings.interval);
        }
        self.release();
    }

    /// Capture a single frame, retrying with fresh connections.
    ///
    /// Never sleeps for the capture interval. Gives up after
    /// `snapshot_abort_threshold` consecutive failed attempts.
    pub fn snapshot_capture(&mut self) -> SnapshotOutcome {
        let threshold = self.settings.snapshot_abort_threshold.max(1);
        let mut failed_attempts = 0u32;

        loop {
            if self.shutdown.is_requested() {
                self.release();
                return SnapshotOutcome::Interrupted;
            }
            self.restart();
            if self.shutdown.is_requested() {
                self.release();
                return SnapshotOutcome::Interrupted;
            }

            let result = self.capture();
            self.release();
            match result {
                Ok(()) => {
                    log::info!("snapshot captured from {}", self.target);
                    return SnapshotOutcome::Captured;
                }
                Err(failure) => {
                    failed_attempts += 1;
                    log::warn!(
                        "snapshot attempt {}/{} failed: {}",
                        failed_attempts,
                        threshold,
                        failure
                    );
                    if failed_attempts >= threshold {
                        log::error!(
                            "snapshot aborted after {} failed attempts against {}",
                            failed_attempts,
                            self.target
                        );
                        return SnapshotOutcome::Aborted {
                            attempts: failed_attempts,
                        };
                    }
                }
            }
        }
    }
}

impl<S: StreamSource, K: FrameSink, P: Sleeper> Drop for CaptureSession<S, K, P> {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use anyhow::Result;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&mut self, _duration: Duration) {}
    }

    #[derive(Default)]
    struct CountingSink(usize);

    impl FrameSink for CountingSink {
        fn write(&mut self, _frame: &Frame) -> Result<()> {
            self.0 += 1;
            Ok(())
        }
    }

    fn session(
        source: SyntheticSource,
    ) -> CaptureSession<SyntheticSource, CountingSink, NoSleep> {
        CaptureSession::new(
            ConnectionTarget::new("stub://unit"),
            source,
            CountingSink::default(),
            CaptureSettings::default(),
            NoSleep,
        )
    }

    fn small_source() -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
        })
    }

    #[test]
    fn release_without_stream_is_noop() {
        let mut session = session(small_source());
        session.release();
        session.release();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn capture_while_disconnected_counts_as_failure() {
        let mut session = session(small_source());
        assert_eq!(session.capture(), Err(CaptureFailure::NotConnected));
        assert_eq!(session.consecutive_failures(), 1);
        assert_eq!(session.sink().0, 0);
    }

    #[test]
    fn open_then_capture_stores_frame() {
        let mut session = session(small_source());
        assert!(session.open());
        assert_eq!(session.state(), SessionState::ConnectedIdle);
        assert_eq!(session.capture(), Ok(()));
        assert_eq!(session.capture(), Ok(()));
        assert_eq!(session.sink().0, 2);
        assert_eq!(session.frames_captured(), 2);
    }

    #[test]
    fn failed_open_stays_disconnected() {
        let mut session = session(small_source().with_failed_opens(1));
        assert!(!session.open());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.open());
    }

    #[test]
    fn capture_failure_display_names_reason() {
        assert_eq!(
            CaptureFailure::IdenticalFrames.to_string(),
            "identical consecutive frames"
        );
        assert!(CaptureFailure::CannotRead("eof".into())
            .to_string()
            .contains("eof"));
    }
}
