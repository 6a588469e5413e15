//! Synthetic camera (`stub://`).
//!
//! Produces RGB frames that alternate between a static scene and an "active"
//! scene whose pixels change every frame. Static stretches yield identical
//! frames, active stretches yield a new frame each tick, which gives the
//! motion-energy classifier something to react to in demos.

use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat};

/// Frames per scene phase (static, then active, then static, ...).
const PHASE_FRAMES: u64 = 150;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// End of stream after this many frames (`None` = endless).
    pub max_frames: Option<u64>,
    /// Sleep between frames to honour `fps`.
    pub pace: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            fps: 30,
            width: 640,
            height: 480,
            max_frames: None,
            pace: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
    last_emit: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
            last_emit: None,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        let phase = self.frame_count / PHASE_FRAMES;
        let active = phase % 2 == 1;
        let drift = if active { self.frame_count } else { 0 };
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 7 + drift * 3 + phase * 11 + 64) % 256) as u8;
        }
        pixels
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

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<(), CaptureError> {
        log::info!("SyntheticSource: connected to {} (synthetic)", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.connected {
            return Err(CaptureError::NotConnected(self.config.url.clone()));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.pace();
        let pixels = self.generate_pixels();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb24,
            self.frame_count,
        )
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn nominal_fps(&self) -> u32 {
        self.config.fps
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
