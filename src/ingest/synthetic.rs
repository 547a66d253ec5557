//! Synthetic stream source.
//!
//! Produces deterministic frames without any network access:
//! - vertical colour gradient background
//! - frame counter band (one block per counter bit, white = set)
//! - wall-clock band (unix seconds, green = set)
//!
//! The counter is shared across reconnects, so two reads never return the same
//! bytes even when the session reopens the stream in between.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{FrameStream, StreamSource};
use crate::cameras::ConnectionTarget;
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// Side length in pixels of one bit block in the overlay bands.
const BIT_BLOCK: usize = 8;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Stream source that fabricates frames locally.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: Arc<AtomicU64>,
    failing_opens: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: Arc::new(AtomicU64::new(0)),
            failing_opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` calls to `open` fail, as a camera that is still booting would.
    pub fn with_failed_opens(self, count: usize) -> Self {
        self.failing_opens.store(count, Ordering::SeqCst);
        self
    }

    /// Frames generated so far, including discarded ones.
    pub fn frames_generated(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }
}

impl StreamSource for SyntheticSource {
    type Stream = SyntheticStream;

    fn open(&mut self, target: &ConnectionTarget) -> Result<SyntheticStream> {
        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("synthetic camera {} refused connection", target));
        }
        log::info!("SyntheticSource: connected to {} (synthetic)", target);
        Ok(SyntheticStream {
            width: self.config.width,
            height: self.config.height,
            frame_count: Arc::clone(&self.frame_count),
            open: true,
        })
    }
}

pub struct SyntheticStream {
    width: u32,
    height: u32,
    frame_count: Arc<AtomicU64>,
    open: bool,
}

impl SyntheticStream {
    fn generate_pixels(&self, counter: u64, seconds: u64) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut pixels = vec![0u8; width * height * BYTES_PER_PIXEL];

        for (row, line) in pixels.chunks_exact_mut(width * BYTES_PER_PIXEL).enumerate() {
            let shade = [
                (row * 255 / height) as u8,
                100,
                ((height - row) * 255 / height) as u8,
            ];
            for px in line.chunks_exact_mut(BYTES_PER_PIXEL) {
                px.copy_from_slice(&shade);
            }
        }

        paint_bits(&mut pixels, width, height, 0, counter, [255, 255, 255]);
        paint_bits(&mut pixels, width, height, BIT_BLOCK, seconds, [0, 255, 0]);
        pixels
    }
}

/// Draw the 64 bits of `value` as a row of blocks starting at `top`.
/// Blocks that fall outside the frame are clipped.
fn paint_bits(
    pixels: &mut [u8],
    width: usize,
    height: usize,
    top: usize,
    value: u64,
    colour: [u8; 3],
) {
    for bit in 0..64 {
        let fill = if (value >> bit) & 1 == 1 {
            colour
        } else {
            [0, 0, 0]
        };
        let left = bit * BIT_BLOCK;
        for y in top..(top + BIT_BLOCK).min(height) {
            for x in left..(left + BIT_BLOCK).min(width) {
                let offset = (y * width + x) * BYTES_PER_PIXEL;
                pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&fill);
            }
        }
    }
}

impl FrameStream for SyntheticStream {
    fn is_open(&self) -> bool {
        self.open
    }

    fn discard_next_frame(&mut self) -> bool {
        if !self.open {
            return false;
        }
        self.frame_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(anyhow!("synthetic stream is closed"));
        }
        let counter = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Frame::new(self.width, self.height, self.generate_pixels(counter, seconds))
    }

    fn close(&mut self) {
        if self.open {
            log::debug!("SyntheticSource: stream closed");
        }
        self.open = false;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("stub://garden")
    }

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(small());
        let mut stream = source.open(&target())?;
        assert!(stream.is_open());

        let frame = stream.read_frame()?;
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.pixels().len(), 64 * 48 * 3);
        Ok(())
    }

    #[test]
    fn consecutive_frames_differ_across_reconnects() -> Result<()> {
        let mut source = SyntheticSource::new(small());
        let mut stream = source.open(&target())?;
        let first = stream.read_frame()?;
        assert!(stream.discard_next_frame());
        let second = stream.read_frame()?;
        stream.close();

        let mut reopened = source.open(&target())?;
        let third = reopened.read_frame()?;

        assert!(!first.is_identical_to(&second));
        assert!(!second.is_identical_to(&third));
        assert_eq!(source.frames_generated(), 4);
        Ok(())
    }

    #[test]
    fn closed_stream_refuses_reads() -> Result<()> {
        let mut source = SyntheticSource::new(small());
        let mut stream = source.open(&target())?;
        stream.close();
        stream.close();

        assert!(!stream.is_open());
        assert!(!stream.discard_next_frame());
        assert!(stream.read_frame().is_err());
        Ok(())
    }

    #[test]
    fn scripted_open_failures_are_consumed() {
        let mut source = SyntheticSource::new(small()).with_failed_opens(2);
        assert!(source.open(&target()).is_err());
        assert!(source.open(&target()).is_err());
        assert!(source.open(&target()).is_ok());
    }

    #[test]
    fn tiny_frames_clip_overlay_bands() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 3,
            height: 2,
        });
        let frame = source.open(&target())?.read_frame()?;
        assert_eq!(frame.pixels().len(), 3 * 2 * 3);
        Ok(())
    }
}
