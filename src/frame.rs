//! Decoded frames and the latest-frame relay slot.
//!
//! - `Frame`: one decoded RGB8 image as delivered by a stream source.
//! - `LatestFrame`: single-slot hand-off between a capture thread and a consumer.
//!   Pushing replaces whatever frame is still waiting (drop-oldest).

use anyhow::{anyhow, Result};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Bytes per pixel of a decoded frame (packed RGB).
pub const BYTES_PER_PIXEL: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Decoded RGB8 frame. Rows are tightly packed (no stride padding).
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * BYTES_PER_PIXEL;
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer has {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Byte-for-byte comparison, including dimensions.
    ///
    /// A camera whose decoder is stuck keeps handing out the same buffer, so an
    /// exact match between two consecutive reads is treated as a stream fault.
    pub fn is_identical_to(&self, other: &Frame) -> bool {
        self == other
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// LatestFrame: single-slot relay
// ----------------------------------------------------------------------------

/// Single-slot frame queue with drop-oldest semantics.
///
/// Clones share the same slot. The producer never blocks; a consumer that falls
/// behind only ever sees the newest frame.
#[derive(Clone, Default)]
pub struct LatestFrame {
    inner: Arc<(Mutex<Slot>, Condvar)>,
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    dropped: u64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing any frame the consumer has not taken yet.
    /// Returns true if an older frame was dropped.
    pub fn push(&self, frame: Frame) -> bool {
        let (lock, ready) = &*self.inner;
        let mut slot = match lock.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let displaced = slot.frame.replace(frame).is_some();
        if displaced {
            slot.dropped += 1;
        }
        ready.notify_one();
        displaced
    }

    /// Take the waiting frame without blocking.
    pub fn try_take(&self) -> Option<Frame> {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(mut slot) => slot.frame.take(),
            Err(poisoned) => poisoned.into_inner().frame.take(),
        }
    }

    /// Wait up to `timeout` for a frame.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let (lock, ready) = &*self.inner;
        let slot = match lock.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut slot = match ready.wait_timeout_while(slot, timeout, |slot| slot.frame.is_none()) {
            Ok((slot, _)) => slot,
            Err(poisoned) => poisoned.into_inner().0,
        };
        slot.frame.take()
    }

    /// Number of frames overwritten before a consumer took them.
    pub fn dropped(&self) -> u64 {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(slot) => slot.dropped,
            Err(poisoned) => poisoned.into_inner().dropped,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        let len = (width * height) as usize * BYTES_PER_PIXEL;
        Frame::new(width, height, vec![value; len]).expect("frame")
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(4, 4, vec![0; 10]).is_err());
        assert!(Frame::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn identical_frames_compare_by_bytes_and_size() {
        let a = solid(4, 2, 7);
        let b = solid(4, 2, 7);
        let c = solid(2, 4, 7);
        let mut pixels = a.pixels().to_vec();
        pixels[5] ^= 1;
        let d = Frame::new(4, 2, pixels).expect("frame");

        assert!(a.is_identical_to(&b));
        assert!(!a.is_identical_to(&c));
        assert!(!a.is_identical_to(&d));
    }

    #[test]
    fn latest_frame_keeps_only_newest() {
        let slot = LatestFrame::new();
        assert!(!slot.push(solid(2, 2, 1)));
        assert!(slot.push(solid(2, 2, 2)));

        let frame = slot.try_take().expect("frame waiting");
        assert_eq!(frame.pixels()[0], 2);
        assert_eq!(slot.dropped(), 1);
        assert!(slot.try_take().is_none());
    }

    #[test]
    fn latest_frame_wakes_waiting_consumer() {
        let slot = LatestFrame::new();
        let producer = slot.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push(solid(2, 2, 9));
        });

        let frame = slot.take_timeout(Duration::from_secs(5));
        handle.join().expect("producer thread");
        assert_eq!(frame.map(|f| f.pixels()[0]), Some(9));
    }

    #[test]
    fn latest_frame_times_out_when_empty() {
        let slot = LatestFrame::new();
        assert!(slot.take_timeout(Duration::from_millis(10)).is_none());
    }
}
