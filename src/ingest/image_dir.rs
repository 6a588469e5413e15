//! Still-image directory source.
//!
//! Replays a local directory of JPEG/PNG images, sorted by file name, as a
//! frame stream. Useful for replaying recorded incidents through the pipeline.
//! The source MUST NOT fetch remote URLs.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat};

#[derive(Clone, Debug)]
pub struct ImageDirConfig {
    pub path: PathBuf,
    pub fps: u32,
    pub pace: bool,
}

pub struct ImageDirSource {
    config: ImageDirConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    connected: bool,
    last_emit: Option<Instant>,
}

impl ImageDirSource {
    pub fn new(config: ImageDirConfig) -> anyhow::Result<Self> {
        if !config.path.is_dir() {
            anyhow::bail!("{} is not a directory", config.path.display());
        }
        Ok(Self {
            config,
            files: Vec::new(),
            cursor: 0,
            connected: false,
            last_emit: None,
        })
    }

    fn pace(&mut self) {
        if !self.config.pace || self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

fn is_image(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<(), CaptureError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.config.path)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "ImageDirSource: connected to {} ({} images)",
            self.config.path.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.connected {
            return Err(CaptureError::NotConnected(
                self.config.path.display().to_string(),
            ));
        }
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.pace();
        let image = image::open(&path)
            .map_err(|e| CaptureError::Decode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        let frame = Frame::new(
            image.into_raw(),
            width,
            height,
            PixelFormat::Rgb24,
            self.cursor as u64,
        )
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn nominal_fps(&self) -> u32 {
        self.config.fps
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.cursor as u64,
            url: self.config.path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_images_in_name_order_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 200u8), ("a.png", 100u8)] {
            image::RgbImage::from_pixel(4, 2, image::Rgb([shade, shade, shade]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = ImageDirSource::new(ImageDirConfig {
            path: dir.path().to_path_buf(),
            fps: 5,
            pace: false,
        })
        .unwrap();
        source.connect().unwrap();

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (4, 2));
        assert_eq!(first.pixels()[0], 100);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.pixels()[0], 200);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 2);
    }

    #[test]
    fn rejects_missing_directory() {
        assert!(ImageDirSource::new(ImageDirConfig {
            path: PathBuf::from("/nonexistent/sentinel/frames"),
            fps: 5,
            pace: false,
        })
        .is_err());
    }
}
