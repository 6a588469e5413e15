#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::{Classifier, Confidence};
use crate::error::InferenceError;
use crate::window::Window;

/// Tract-based backend for ONNX sequence models.
///
/// Loads a local model taking a `[1, window_size, feature_len]` f32 tensor and
/// producing the behavior score as its first output value. No network I/O.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    window_size: usize,
    feature_len: usize,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, window_size: usize, feature_len: usize) -> Result<Self> {
        if window_size == 0 || feature_len == 0 {
            return Err(anyhow!("model input dimensions must be non-zero"));
        }
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, window_size, feature_len)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            window_size,
            feature_len,
        })
    }

    fn build_input(&self, window: &Window) -> Result<Tensor, InferenceError> {
        if window.len() != self.window_size || window.feature_len() != self.feature_len {
            return Err(InferenceError::MalformedInput(format!(
                "window {}x{} does not match model input {}x{}",
                window.len(),
                window.feature_len(),
                self.window_size,
                self.feature_len
            )));
        }
        let values = window.flatten();
        if values.len() != self.window_size * self.feature_len {
            return Err(InferenceError::MalformedInput(
                "window has ragged feature vectors".to_string(),
            ));
        }
        let input = tract_ndarray::Array3::from_shape_vec(
            (1, self.window_size, self.feature_len),
            values,
        )
        .map_err(|e| InferenceError::MalformedInput(e.to_string()))?;
        Ok(input.into_tensor())
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, window: &Window) -> Result<Confidence, InferenceError> {
        let input = self.build_input(window)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Backend(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".to_string()))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(format!("output tensor was not f32: {}", e)))?;
        let score = scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| InferenceError::InvalidOutput("empty output tensor".to_string()))?;
        Confidence::new(score)
    }
}
