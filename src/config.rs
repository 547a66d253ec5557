use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cameras::{DEFAULT_CAMERAS_PATH, DEFAULT_CREDENTIALS_PATH};
use crate::ingest::SyntheticConfig;
use crate::session::{
    CaptureSettings, DEFAULT_CAPTURE_INTERVAL, DEFAULT_FLUSH_SETTLE, DEFAULT_RESTART_SETTLE,
    DEFAULT_SNAPSHOT_ABORT_THRESHOLD,
};

const DEFAULT_OUTPUT_ROOT: &str = ".";
const DEFAULT_SYNTHETIC_WIDTH: u32 = 640;
const DEFAULT_SYNTHETIC_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TimelapseConfigFile {
    paths: Option<PathsConfigFile>,
    capture: Option<CaptureConfigFile>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsConfigFile {
    cameras: Option<PathBuf>,
    credentials: Option<PathBuf>,
    output_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    interval_secs: Option<u64>,
    flush_frames: Option<u32>,
    flush_settle_secs: Option<u64>,
    restart_settle_secs: Option<u64>,
    snapshot_abort_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SyntheticConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TimelapseConfig {
    pub cameras_path: PathBuf,
    pub credentials_path: PathBuf,
    pub output_root: PathBuf,
    pub capture: CaptureSettings,
    pub synthetic: SyntheticConfig,
}

impl TimelapseConfig {
    /// Load from `TIMELAPSE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TIMELAPSE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override the capture interval and flush count from the command line.
    pub fn apply_overrides(
        &mut self,
        interval_secs: Option<u64>,
        flush_frames: Option<u32>,
    ) -> Result<()> {
        if let Some(secs) = interval_secs {
            self.capture.interval = Duration::from_secs(secs);
        }
        if let Some(frames) = flush_frames {
            self.capture.flush_frames = frames;
        }
        self.validate()
    }

    fn from_file(file: TimelapseConfigFile) -> Self {
        let paths = file.paths.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let synthetic = file.synthetic.unwrap_or_default();

        Self {
            cameras_path: paths
                .cameras
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CAMERAS_PATH)),
            credentials_path: paths
                .credentials
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH)),
            output_root: paths
                .output_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
            capture: CaptureSettings {
                interval: capture
                    .interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_CAPTURE_INTERVAL),
                flush_frames: capture.flush_frames.unwrap_or(0),
                flush_settle: capture
                    .flush_settle_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_FLUSH_SETTLE),
                restart_settle: capture
                    .restart_settle_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RESTART_SETTLE),
                snapshot_abort_threshold: capture
                    .snapshot_abort_threshold
                    .unwrap_or(DEFAULT_SNAPSHOT_ABORT_THRESHOLD),
            },
            synthetic: SyntheticConfig {
                width: synthetic.width.unwrap_or(DEFAULT_SYNTHETIC_WIDTH),
                height: synthetic.height.unwrap_or(DEFAULT_SYNTHETIC_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("TIMELAPSE_CAMERAS") {
            if !path.trim().is_empty() {
                self.cameras_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("TIMELAPSE_CREDENTIALS") {
            if !path.trim().is_empty() {
                self.credentials_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("TIMELAPSE_OUTPUT_DIR") {
            if !path.trim().is_empty() {
                self.output_root = PathBuf::from(path);
            }
        }
        if let Ok(interval) = std::env::var("TIMELAPSE_INTERVAL_SECS") {
            let seconds: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("TIMELAPSE_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.capture.interval = Duration::from_secs(seconds);
        }
        if let Ok(flush) = std::env::var("TIMELAPSE_FLUSH_FRAMES") {
            self.capture.flush_frames = flush
                .trim()
                .parse()
                .map_err(|_| anyhow!("TIMELAPSE_FLUSH_FRAMES must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.interval.is_zero() {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if self.capture.snapshot_abort_threshold == 0 {
            return Err(anyhow!("snapshot abort threshold must be greater than zero"));
        }
        if self.synthetic.width == 0 || self.synthetic.height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TimelapseConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let cfg = TimelapseConfig::from_file(TimelapseConfigFile::default());
        assert_eq!(cfg.capture, CaptureSettings::default());
        assert_eq!(cfg.capture.interval.as_secs(), 600);
        assert_eq!(cfg.capture.flush_frames, 0);
        assert_eq!(cfg.cameras_path, PathBuf::from("cameras.toml"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn overrides_reject_zero_interval() {
        let mut cfg = TimelapseConfig::from_file(TimelapseConfigFile::default());
        assert!(cfg.apply_overrides(Some(0), None).is_err());

        let mut cfg = TimelapseConfig::from_file(TimelapseConfigFile::default());
        cfg.apply_overrides(Some(30), Some(4)).expect("valid overrides");
        assert_eq!(cfg.capture.interval, Duration::from_secs(30));
        assert_eq!(cfg.capture.flush_frames, 4);
    }
}
