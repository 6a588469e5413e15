//! Frame ingestion sources.
//!
//! This module provides sources of `Frame`s for the pipeline driver:
//! - Synthetic camera (`stub://` URLs, testing and demos)
//! - Directory of still images (feature: ingest-image-dir)
//!
//! Sources are polled by the driver, one frame per iteration. A source signals
//! end-of-stream with `Ok(None)`. Any `Err` is a `CaptureError` and ends the run.

#[cfg(feature = "ingest-image-dir")]
pub mod image_dir;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::error::CaptureError;
use crate::frame::Frame;

#[cfg(feature = "ingest-image-dir")]
pub use image_dir::{ImageDirConfig, ImageDirSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// A producer of frames at a nominal rate.
pub trait FrameSource: Send {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Nominal frames per second.
    fn nominal_fps(&self) -> u32;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Settings used to pick and configure a source from a URL.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    pub url: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Synthetic sources stop after this many frames.
    pub max_frames: Option<u64>,
    /// Sleep between frames to honour `fps`.
    pub pace: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            fps: 30,
            width: 640,
            height: 480,
            max_frames: None,
            pace: true,
        }
    }
}

/// Open the source named by `settings.url`.
///
/// `stub://` selects the synthetic camera. A plain local path selects the
/// image directory source when built with `ingest-image-dir`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.trim().is_empty() {
        return Err(anyhow!("source url must not be empty"));
    }
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: settings.url.clone(),
            fps: settings.fps,
            width: settings.width,
            height: settings.height,
            max_frames: settings.max_frames,
            pace: settings.pace,
        })));
    }
    if settings.url.contains("://") {
        return Err(anyhow!(
            "unsupported source url {} (expected stub:// or a local directory)",
            settings.url
        ));
    }
    #[cfg(feature = "ingest-image-dir")]
    {
        Ok(Box::new(ImageDirSource::new(ImageDirConfig {
            path: settings.url.clone().into(),
            fps: settings.fps,
            pace: settings.pace,
        })?))
    }
    #[cfg(not(feature = "ingest-image-dir"))]
    {
        Err(anyhow!(
            "directory ingestion requires the ingest-image-dir feature"
        ))
    }
}
