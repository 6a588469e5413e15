//! Fixed-size, non-overlapping feature windows.
//!
//! The aggregator collects one feature vector per signal frame. Once exactly
//! `size` vectors are collected they are emitted as a `Window` and collection
//! restarts from empty. No-signal frames contribute nothing and do not reset
//! a partially filled window; a partial window is kept indefinitely.

use crate::pose::FeatureVector;

/// Default number of feature vectors per window.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// An ordered group of exactly N feature vectors, classified as one unit.
#[derive(Clone, Debug)]
pub struct Window {
    vectors: Vec<FeatureVector>,
    sequence: u64,
}

impl Window {
    /// Zero-based emission index of this window.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    /// Feature length of the first vector (0 for an empty window).
    pub fn feature_len(&self) -> usize {
        self.vectors.first().map(|v| v.len()).unwrap_or(0)
    }

    /// Row-major `[len x feature_len]` values.
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.feature_len());
        for v in &self.vectors {
            out.extend_from_slice(v.as_slice());
        }
        out
    }
}

pub struct WindowAggregator {
    size: usize,
    pending: Vec<FeatureVector>,
    emitted: u64,
    skipped: u64,
}

impl WindowAggregator {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            pending: Vec::with_capacity(size),
            emitted: 0,
            skipped: 0,
        }
    }

    /// Feed one frame's extraction outcome. Returns a window when one completes.
    pub fn observe(&mut self, features: Option<FeatureVector>) -> Option<Window> {
        let Some(features) = features else {
            self.skipped += 1;
            return None;
        };
        self.pending.push(features);
        if self.pending.len() < self.size {
            return None;
        }
        let vectors = std::mem::replace(&mut self.pending, Vec::with_capacity(self.size));
        let window = Window {
            vectors,
            sequence: self.emitted,
        };
        self.emitted += 1;
        Some(window)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Vectors collected toward the next window.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn windows_emitted(&self) -> u64 {
        self.emitted
    }

    /// No-signal observations seen so far.
    pub fn no_signal_frames(&self) -> u64 {
        self.skipped
    }
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(tag: f32) -> FeatureVector {
        FeatureVector::new(vec![tag, tag])
    }

    #[test]
    fn emits_one_window_after_exactly_n_signals() {
        let mut agg = WindowAggregator::new(20);
        let mut windows = Vec::new();
        for i in 0..25 {
            if let Some(w) = agg.observe(Some(fv(i as f32))) {
                windows.push((i, w));
            }
        }
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].0, 19);
        assert_eq!(windows[0].1.len(), 20);
        assert_eq!(agg.pending_len(), 5);
    }

    #[test]
    fn no_signal_never_enters_or_resets_a_window() {
        let mut agg = WindowAggregator::new(3);
        // signal pattern: S N S N N S S S N S S
        let pattern = [1, 0, 1, 0, 0, 1, 1, 1, 0, 1, 1];
        let mut tag = 0.0;
        let mut windows = Vec::new();
        for bit in pattern {
            let obs = if bit == 1 {
                tag += 1.0;
                Some(fv(tag))
            } else {
                None
            };
            if let Some(w) = agg.observe(obs) {
                windows.push(w);
            }
        }
        assert_eq!(windows.len(), 2);
        let tags: Vec<Vec<f32>> = windows
            .iter()
            .map(|w| w.vectors().iter().map(|v| v.as_slice()[0]).collect())
            .collect();
        assert_eq!(tags, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(agg.pending_len(), 1);
        assert_eq!(agg.no_signal_frames(), 4);
        assert_eq!(windows[1].sequence(), 1);
    }

    #[test]
    fn partial_window_survives_long_signal_loss() {
        let mut agg = WindowAggregator::new(2);
        assert!(agg.observe(Some(fv(1.0))).is_none());
        for _ in 0..10_000 {
            assert!(agg.observe(None).is_none());
        }
        let w = agg.observe(Some(fv(2.0))).unwrap();
        assert_eq!(w.flatten(), vec![1.0, 1.0, 2.0, 2.0]);
    }
}
