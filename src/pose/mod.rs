//! Pose landmark features.
//!
//! A `FeatureExtractor` maps one frame to a `FeatureVector` of pose landmarks,
//! or to "no signal" (`None`) when no body is visible. No-signal frames are
//! valid outcomes, not errors.

mod synthetic;

pub use synthetic::SyntheticPoseExtractor;

use crate::frame::Frame;

/// Landmarks per body in the standard full-body pose topology.
pub const POSE_LANDMARKS: usize = 33;

/// Values stored per landmark: x, y, z, visibility.
pub const VALUES_PER_LANDMARK: usize = 4;

/// Length of a full-body feature vector.
pub const POSE_FEATURE_LEN: usize = POSE_LANDMARKS * VALUES_PER_LANDMARK;

/// One body landmark in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

/// Flattened landmark coordinates for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Flatten landmarks as `[x0, y0, z0, v0, x1, ...]`.
    pub fn from_landmarks(landmarks: &[Landmark]) -> Self {
        let mut values = Vec::with_capacity(landmarks.len() * VALUES_PER_LANDMARK);
        for lm in landmarks {
            values.extend_from_slice(&[lm.x, lm.y, lm.z, lm.visibility]);
        }
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Landmarks back out of the flattened layout. Trailing partial groups are ignored.
    pub fn landmarks(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.0.chunks_exact(VALUES_PER_LANDMARK).map(|c| Landmark {
            x: c[0],
            y: c[1],
            z: c[2],
            visibility: c[3],
        })
    }
}

/// Maps a frame to pose features.
///
/// Implementations only borrow the frame for the duration of the call.
pub trait FeatureExtractor: Send {
    fn name(&self) -> &'static str;

    /// Extract features, or `None` when there is no usable signal.
    fn extract(&mut self, frame: &Frame) -> Option<FeatureVector>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmarks_flatten_and_unflatten() {
        let lms = [
            Landmark {
                x: 0.1,
                y: 0.2,
                z: 0.3,
                visibility: 0.9,
            },
            Landmark {
                x: 0.5,
                y: 0.6,
                z: -0.1,
                visibility: 0.4,
            },
        ];
        let fv = FeatureVector::from_landmarks(&lms);
        assert_eq!(fv.as_slice(), &[0.1, 0.2, 0.3, 0.9, 0.5, 0.6, -0.1, 0.4]);
        let back: Vec<Landmark> = fv.landmarks().collect();
        assert_eq!(back, lms.to_vec());
    }
}
