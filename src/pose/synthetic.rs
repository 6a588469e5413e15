use sha2::{Digest, Sha256};

use super::{FeatureExtractor, FeatureVector, Landmark, POSE_LANDMARKS};
use crate::frame::Frame;

/// Deterministic stand-in for a real pose estimator.
///
/// Landmarks are derived from a coarse luma histogram of the frame, so
/// identical frames produce identical poses and changing scenes produce moving
/// poses. Dark or flat frames report no signal.
pub struct SyntheticPoseExtractor {
    min_mean_luma: f32,
    min_luma_spread: u8,
    sample_step: usize,
}

impl SyntheticPoseExtractor {
    pub fn new() -> Self {
        Self {
            min_mean_luma: 16.0,
            min_luma_spread: 8,
            sample_step: 97,
        }
    }

    /// Frames darker than this mean luma are treated as no signal.
    pub fn with_min_mean_luma(mut self, luma: f32) -> Self {
        self.min_mean_luma = luma;
        self
    }
}

impl Default for SyntheticPoseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for SyntheticPoseExtractor {
    fn name(&self) -> &'static str {
        "synthetic-pose"
    }

    fn extract(&mut self, frame: &Frame) -> Option<FeatureVector> {
        // Coarse luma histogram (very lossy)
        let mut histogram = [0u32; 16];
        let mut sum = 0u64;
        let mut count = 0u64;
        let mut lo = u8::MAX;
        let mut hi = u8::MIN;
        for luma in frame.luma_samples(self.sample_step) {
            histogram[(luma / 16) as usize] += 1;
            sum += luma as u64;
            count += 1;
            lo = lo.min(luma);
            hi = hi.max(luma);
        }
        if count == 0 {
            return None;
        }
        let mean = sum as f32 / count as f32;
        if mean < self.min_mean_luma || hi.saturating_sub(lo) < self.min_luma_spread {
            return None;
        }

        let mut hasher = Sha256::new();
        for bin in &histogram {
            hasher.update(bin.to_le_bytes());
        }
        let seed: [u8; 32] = hasher.finalize().into();

        let visibility = (mean / 255.0).clamp(0.0, 1.0);
        let landmarks: Vec<Landmark> = (0..POSE_LANDMARKS)
            .map(|i| {
                let mut h = Sha256::new();
                h.update(seed);
                h.update((i as u32).to_le_bytes());
                let d: [u8; 32] = h.finalize().into();
                Landmark {
                    x: d[0] as f32 / 255.0,
                    y: d[1] as f32 / 255.0,
                    z: d[2] as f32 / 255.0 - 0.5,
                    visibility,
                }
            })
            .collect();
        Some(FeatureVector::from_landmarks(&landmarks))
    }
}
