mod backend;
mod backends;

pub use backend::{Classifier, Confidence};
pub use backends::{build_classifier, ClassifierSettings, MotionEnergyClassifier};

#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
