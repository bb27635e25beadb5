use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;

use crate::geometry::{BoxSize, OVERSAMPLE, THUMBNAIL_WIDTH};
use crate::transition::TransitionTimings;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("flip_settle_ms ({settle:?}) must be shorter than flip_duration_ms ({total:?})")]
    Timings { settle: Duration, total: Duration },
    #[error("frame_interval_ms must be greater than zero")]
    FrameInterval,
    #[error("thumbnail_width must be a positive number, got {0}")]
    ThumbnailWidth(f32),
    #[error("oversample must be a positive number, got {0}")]
    Oversample(f32),
    #[error("max_page_box must have positive width and height")]
    PageBox,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Path or URL opened when no document is given on the command line.
    pub default_document: String,
    #[serde(rename = "flip_settle_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub flip_settle: Duration,
    #[serde(rename = "flip_duration_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub flip_duration: Duration,
    #[serde(rename = "frame_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub frame_interval: Duration,
    pub thumbnail_width: f32,
    pub oversample: f32,
    /// Upper bound for the page box in logical pixels; the page area of the
    /// window is used as-is when unset.
    pub max_page_box: Option<BoxSize>,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let timings = TransitionTimings::default();
        Self {
            default_document: "SUNUM.pdf".to_string(),
            flip_settle: timings.settle,
            flip_duration: timings.total,
            frame_interval: Duration::from_millis(33),
            thumbnail_width: THUMBNAIL_WIDTH,
            oversample: OVERSAMPLE,
            max_page_box: Some(BoxSize::new(900.0, 530.0)),
            pdfium_library: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flip_settle >= self.flip_duration {
            return Err(ConfigError::Timings {
                settle: self.flip_settle,
                total: self.flip_duration,
            });
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::FrameInterval);
        }
        if !(self.thumbnail_width.is_finite() && self.thumbnail_width > 0.0) {
            return Err(ConfigError::ThumbnailWidth(self.thumbnail_width));
        }
        if !(self.oversample.is_finite() && self.oversample > 0.0) {
            return Err(ConfigError::Oversample(self.oversample));
        }
        if let Some(cap) = self.max_page_box {
            if !cap.is_valid() {
                return Err(ConfigError::PageBox);
            }
        }
        Ok(())
    }

    pub fn timings(&self) -> TransitionTimings {
        TransitionTimings {
            settle: self.flip_settle,
            total: self.flip_duration,
        }
    }
}
