pub mod motion;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub use motion::MotionEnergyClassifier;

#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;

use super::Classifier;

/// Backend selection, resolved from configuration.
#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    /// `motion-energy` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub window_size: usize,
    pub feature_len: usize,
}

/// Build and warm up the configured classifier backend.
pub fn build_classifier(settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
    let mut classifier: Box<dyn Classifier> = match settings.backend.as_str() {
        "motion-energy" | "stub" => Box::new(MotionEnergyClassifier::new()),
        "tract" => build_tract(settings)?,
        other => return Err(anyhow!("unknown classifier backend '{}'", other)),
    };
    classifier
        .warm_up()
        .map_err(|e| anyhow!("classifier {} warm-up failed: {}", classifier.name(), e))?;
    log::info!("classifier backend: {}", classifier.name());
    Ok(classifier)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires classifier.model_path"))?;
    Ok(Box::new(TractClassifier::new(
        path,
        settings.window_size,
        settings.feature_len,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}
