use crate::error::InferenceError;
use crate::window::Window;

/// Classifier output in `[0, 1]`: likelihood of the target behavior.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
    /// Wrap a raw model score. Non-finite scores are rejected, finite ones are
    /// clamped into `[0, 1]`.
    pub fn new(value: f32) -> Result<Self, InferenceError> {
        if !value.is_finite() {
            return Err(InferenceError::InvalidOutput(format!(
                "non-finite confidence {}",
                value
            )));
        }
        Ok(Self(value.clamp(0.0, 1.0)))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

/// Classifier backend trait.
///
/// Called off the capture path from a worker thread. Calls may be slow; the
/// pipeline serializes access, so `classify` may take `&mut self`.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Score one completed window.
    fn classify(&mut self, window: &Window) -> Result<Confidence, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }
}
