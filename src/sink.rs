//! Frame sinks.
//!
//! A sink durably stores a captured frame and reports success or failure. The
//! capture session only looks at the outcome; naming and persistence belong here.
//!
//! - `ImageDirectorySink`: one PNG per capture under `<root>/<label>/`
//! - `RelaySink`: wraps another sink and mirrors each stored frame into a
//!   `LatestFrame` slot for a live consumer

use anyhow::{anyhow, Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::frame::{Frame, LatestFrame};

/// Timestamp layout embedded in every image file name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub trait FrameSink {
    /// Persist `frame`. An error means nothing usable was stored.
    fn write(&mut self, frame: &Frame) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        (**self).write(frame)
    }
}

// ----------------------------------------------------------------------------
// ImageDirectorySink
// ----------------------------------------------------------------------------

/// Writes `<root>/<label>/<label>-YYYY-MM-DD-HH-MM-SS.png` per frame.
///
/// A second capture within the same second gets a `-2`, `-3`, ... suffix instead
/// of replacing the earlier file.
#[derive(Clone, Debug)]
pub struct ImageDirectorySink {
    label: String,
    directory: PathBuf,
    last_written: Option<PathBuf>,
}

impl ImageDirectorySink {
    pub fn new(output_root: &Path, label: &str) -> Result<Self> {
        validate_label(label)?;
        let directory = output_root.join(label);
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("create capture directory {}", directory.display()))?;
        Ok(Self {
            label: label.to_string(),
            directory,
            last_written: None,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }

    fn path_for(&self, timestamp: &str) -> PathBuf {
        let path = self
            .directory
            .join(format!("{}-{}.png", self.label, timestamp));
        if !path.exists() {
            return path;
        }
        log::warn!(
            "{} already exists, capturing faster than timestamp resolution",
            path.display()
        );
        (2u32..)
            .map(|n| {
                self.directory
                    .join(format!("{}-{}-{}.png", self.label, timestamp, n))
            })
            .find(|candidate| !candidate.exists())
            .unwrap_or(path)
    }
}

impl FrameSink for ImageDirectorySink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let path = self.path_for(&timestamp);

        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write image {}", path.display()))?;

        log::info!("Saved image: {}", path.display());
        self.last_written = Some(path);
        Ok(())
    }
}

/// Labels become directory and file names, so they must be one plain path component.
fn validate_label(label: &str) -> Result<()> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("capture label must not be empty"));
    }
    if trimmed != label {
        return Err(anyhow!(
            "capture label must not start or end with whitespace"
        ));
    }
    let mut components = Path::new(label).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(anyhow!(
            "capture label '{}' must be a single directory name",
            label
        )),
    }
}

// ----------------------------------------------------------------------------
// RelaySink
// ----------------------------------------------------------------------------

/// Producer adapter: store through `inner`, then publish to a single-slot relay.
///
/// Frames that fail to store are not relayed.
pub struct RelaySink<S> {
    inner: S,
    relay: LatestFrame,
}

impl<S: FrameSink> RelaySink<S> {
    pub fn new(inner: S, relay: LatestFrame) -> Self {
        Self { inner, relay }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FrameSink> FrameSink for RelaySink<S> {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.inner.write(frame)?;
        if self.relay.push(frame.clone()) {
            log::debug!("relay consumer behind, dropped oldest frame");
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
