//! Frame ingestion sources.
//!
//! This module provides the stream capability consumed by the capture session:
//! - RTSP network cameras (feature: rtsp-gstreamer)
//! - Synthetic source (testing, no network)
//!
//! A `StreamSource` opens a `FrameStream` for a connection target. The session
//! owns at most one open stream at a time and always closes it before dropping it.
//!
//! Stream implementations are responsible for:
//! - Decoding frames into packed RGB
//! - Reporting read failures as errors (never as empty frames)
//! - Closing without raising; close errors are logged internally

use anyhow::Result;

use crate::cameras::ConnectionTarget;
use crate::frame::Frame;

pub mod rtsp;
pub mod synthetic;

pub use rtsp::{RtspConfig, RtspSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Something that can open a camera stream by URL.
pub trait StreamSource {
    type Stream: FrameStream;

    /// Open a stream. An error means the session stays disconnected.
    fn open(&mut self, target: &ConnectionTarget) -> Result<Self::Stream>;
}

/// An opened camera stream.
pub trait FrameStream {
    fn is_open(&self) -> bool;

    /// Pull and drop one frame. Best effort: `false` is logged, never escalated.
    fn discard_next_frame(&mut self) -> bool;

    /// Read and decode the next frame.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Release the stream. Must not panic; failures are logged by the implementation.
    fn close(&mut self);
}
