//! Timelapse capture engine for RTSP network cameras.
//!
//! This crate keeps a long-running process attached to a camera that disconnects,
//! stalls, or serves frozen frames, and writes one image per interval to disk.
//!
//! # Architecture
//!
//! - `ingest`: stream sources (RTSP via GStreamer, synthetic for tests)
//! - `sink`: frame sinks (timestamped PNG directory, live relay adapter)
//! - `backoff`: step-then-exponential reconnect waits
//! - `session`: the capture state machine and its three modes
//! - `cameras`: camera registry, credential store, URL resolution
//! - `config`: file and environment configuration
//! - `pace`: sleeping and cooperative shutdown

pub mod backoff;
pub mod cameras;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod pace;
pub mod session;
pub mod sink;

pub use backoff::next_backoff;
pub use cameras::{CameraRegistry, ConnectionTarget, CredentialStore, Credentials};
pub use config::TimelapseConfig;
pub use frame::{Frame, LatestFrame};
pub use ingest::{
    FrameStream, RtspConfig, RtspSource, StreamSource, SyntheticConfig, SyntheticSource,
};
pub use pace::{Shutdown, Sleeper, ThreadSleeper};
pub use session::{
    CaptureFailure, CaptureMode, CaptureSession, CaptureSettings, SessionState, SnapshotOutcome,
};
pub use sink::{FrameSink, ImageDirectorySink, RelaySink};
