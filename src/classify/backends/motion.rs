use crate::classify::backend::{Classifier, Confidence};
use crate::error::InferenceError;
use crate::pose::VALUES_PER_LANDMARK;
use crate::window::Window;

/// Heuristic backend scoring how violently the pose moves within a window.
///
/// Energy is the mean visibility-weighted landmark displacement between
/// consecutive vectors, squashed into `[0, 1)` with `1 - exp(-gain * energy)`.
pub struct MotionEnergyClassifier {
    gain: f32,
}

impl MotionEnergyClassifier {
    pub fn new() -> Self {
        Self { gain: 4.0 }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    fn validate(window: &Window) -> Result<usize, InferenceError> {
        if window.is_empty() {
            return Err(InferenceError::MalformedInput("empty window".to_string()));
        }
        let feature_len = window.feature_len();
        if feature_len == 0 || feature_len % VALUES_PER_LANDMARK != 0 {
            return Err(InferenceError::MalformedInput(format!(
                "feature length {} is not a whole number of landmarks",
                feature_len
            )));
        }
        if let Some(bad) = window.vectors().iter().find(|v| v.len() != feature_len) {
            return Err(InferenceError::MalformedInput(format!(
                "mixed feature lengths {} and {}",
                feature_len,
                bad.len()
            )));
        }
        Ok(feature_len)
    }
}

impl Default for MotionEnergyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for MotionEnergyClassifier {
    fn name(&self) -> &'static str {
        "motion-energy"
    }

    fn classify(&mut self, window: &Window) -> Result<Confidence, InferenceError> {
        Self::validate(window)?;
        let vectors = window.vectors();
        if vectors.len() < 2 {
            return Confidence::new(0.0);
        }

        let mut total = 0.0f32;
        for pair in vectors.windows(2) {
            let mut weighted = 0.0f32;
            let mut weight = 0.0f32;
            for (a, b) in pair[0].landmarks().zip(pair[1].landmarks()) {
                let w = a.visibility.min(b.visibility).max(0.0);
                let d = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
                weighted += w * d;
                weight += w;
            }
            if weight > 0.0 {
                total += weighted / weight;
            }
        }
        let energy = total / (vectors.len() - 1) as f32;
        Confidence::new(1.0 - (-self.gain * energy).exp())
    }
}
