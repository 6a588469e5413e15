//! Frames and the rolling evidence buffer.
//!
//! - `Frame`: Immutable captured image. Pixel bytes are shared, so cloning a
//!   frame into the buffer or an alert snapshot never copies pixels.
//! - `FrameBuffer`: Bounded ring buffer holding the last `fps x retention`
//!   frames. It is the evidence that an alert persists.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Hard cap on buffer capacity regardless of configured fps and retention.
/// 120 fps for 60 seconds.
pub const MAX_BUFFER_FRAMES: usize = 7200;

// ----------------------------------------------------------------------------
// PixelFormat
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    Bgr24,
    Nv12,
}

impl PixelFormat {
    /// Expected byte length of a `width x height` frame in this format.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let plane = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Gray8 => Some(plane),
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => plane.checked_mul(3),
            PixelFormat::Nv12 => plane.checked_add(plane / 2),
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            PixelFormat::Gray8 => 0,
            PixelFormat::Rgb24 => 1,
            PixelFormat::Bgr24 => 2,
            PixelFormat::Nv12 => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PixelFormat::Gray8),
            1 => Some(PixelFormat::Rgb24),
            2 => Some(PixelFormat::Bgr24),
            3 => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image sample.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Source-assigned capture sequence number (strictly increasing per source).
    pub sequence: u64,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
}

impl Frame {
    /// Build a frame, validating the pixel length against the format.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self> {
        let expected = format
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data: data.into(),
            width,
            height,
            format,
            sequence,
            captured_at: SystemTime::now(),
        })
    }

    pub fn with_capture_time(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Luma plane sampled every `step` pixels. Used by feature extraction.
    pub fn luma_samples(&self, step: usize) -> impl Iterator<Item = u8> + '_ {
        let step = step.max(1);
        let plane = self.width as usize * self.height as usize;
        let channels = match self.format {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Gray8 | PixelFormat::Nv12 => 1,
        };
        (0..plane).step_by(step).map(move |i| {
            let offset = i * channels;
            if channels == 3 {
                let px = &self.data[offset..offset + 3];
                ((px[0] as u16 + px[1] as u16 + px[2] as u16) / 3) as u8
            } else {
                self.data[offset]
            }
        })
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer: bounded ring buffer of recent frames
// ----------------------------------------------------------------------------

/// Bounded ring buffer for evidence frames.
///
/// - Capacity is fixed at construction (`fps x retention_secs`, capped at
///   `MAX_BUFFER_FRAMES`)
/// - Pushing into a full buffer evicts the oldest frame first
/// - `snapshot` hands out an independent copy so alert jobs are unaffected by
///   later pushes
pub struct FrameBuffer {
    buffer: VecDeque<Frame>,
    capacity: usize,
    evicted: u64,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BUFFER_FRAMES);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Size the buffer to hold `retention` worth of frames at `fps`.
    pub fn for_retention(fps: u32, retention: Duration) -> Self {
        Self::new(capacity_for(fps, retention))
    }

    /// Push a frame, evicting the oldest one when full.
    pub fn push(&mut self, frame: Frame) {
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.evicted += 1;
        }
        self.buffer.push_back(frame);
    }

    /// Independent copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.buffer.iter().cloned().collect()
    }

    /// Most recent frame (non-consuming).
    pub fn latest(&self) -> Option<&Frame> {
        self.buffer.back()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames dropped by eviction since construction.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Memory usage estimate.
    pub fn memory_bytes(&self) -> usize {
        self.buffer.iter().map(|f| f.byte_len()).sum()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Buffer capacity for `retention` at `fps`, at least one frame.
pub fn capacity_for(fps: u32, retention: Duration) -> usize {
    let frames = (fps as u64).saturating_mul(retention.as_secs()).max(1);
    usize::try_from(frames)
        .unwrap_or(MAX_BUFFER_FRAMES)
        .min(MAX_BUFFER_FRAMES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(seq: u64) -> Frame {
        Frame::new(vec![(seq % 256) as u8; 4], 2, 2, PixelFormat::Gray8, seq).unwrap()
    }

    #[test]
    fn frame_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 5], 2, 2, PixelFormat::Gray8, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24, 0).is_ok());
        assert!(Frame::new(vec![0u8; 6], 2, 2, PixelFormat::Nv12, 0).is_ok());
    }

    #[test]
    fn buffer_size_is_min_of_pushes_and_capacity() {
        for pushes in [0usize, 1, 7, 10, 11, 35] {
            let mut buf = FrameBuffer::new(10);
            for seq in 0..pushes {
                buf.push(make_frame(seq as u64));
            }
            assert_eq!(buf.len(), pushes.min(10));
        }
    }

    #[test]
    fn buffer_keeps_last_frames_in_arrival_order() {
        let mut buf = FrameBuffer::new(4);
        for seq in 0..9 {
            buf.push(make_frame(seq));
        }
        let seqs: Vec<u64> = buf.snapshot().iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![5, 6, 7, 8]);
        assert_eq!(buf.evicted(), 5);
        assert_eq!(buf.latest().map(|f| f.sequence), Some(8));
    }

    #[test]
    fn snapshot_is_independent_of_later_pushes() {
        let mut buf = FrameBuffer::new(3);
        for seq in 0..3 {
            buf.push(make_frame(seq));
        }
        let snap = buf.snapshot();
        buf.push(make_frame(3));
        buf.push(make_frame(4));
        let seqs: Vec<u64> = snap.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn capacity_follows_fps_and_retention() {
        assert_eq!(capacity_for(30, Duration::from_secs(10)), 300);
        assert_eq!(capacity_for(0, Duration::from_secs(10)), 1);
        assert_eq!(capacity_for(1000, Duration::from_secs(1000)), MAX_BUFFER_FRAMES);
        assert_eq!(FrameBuffer::for_retention(10, Duration::from_secs(3)).capacity(), 30);
    }

    #[test]
    fn luma_samples_average_rgb_channels() {
        let frame = Frame::new(vec![30, 60, 90, 0, 0, 0], 2, 1, PixelFormat::Rgb24, 0).unwrap();
        let luma: Vec<u8> = frame.luma_samples(1).collect();
        assert_eq!(luma, vec![60, 0]);
    }
}
