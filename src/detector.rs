//! Threshold + cooldown debouncing of classifier output.
//!
//! The detector is a cooldown-gated edge trigger rather than a sticky alarm:
//! a confidence at or above the threshold fires an alert only when more than
//! `cooldown` has elapsed since the previous alert. The displayed label always
//! follows the latest classifier output, whether or not an alert fires.
//!
//! State lives behind one `Mutex` so window tasks completing in close
//! succession serialize their updates.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::classify::Confidence;
use crate::error::PipelineError;

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_POSITIVE_LABEL: &str = "aggression";
pub const DEFAULT_NEGATIVE_LABEL: &str = "no aggression";

#[derive(Clone, Debug)]
pub struct DetectionPolicy {
    pub threshold: f32,
    pub cooldown: Duration,
    pub positive_label: String,
    pub negative_label: String,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            positive_label: DEFAULT_POSITIVE_LABEL.to_string(),
            negative_label: DEFAULT_NEGATIVE_LABEL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectionState {
    pub current_label: String,
    /// Never moves backwards.
    pub last_alert_at: Option<Instant>,
    pub alerts_fired: u64,
    pub alerts_suppressed: u64,
}

/// Outcome of feeding one confidence to the detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Below threshold.
    Negative,
    /// Positive, but inside the cooldown of the previous alert.
    Suppressed { label: String, remaining: Duration },
    /// Positive and outside cooldown: enqueue an alert job.
    Fire { label: String },
}

impl Decision {
    pub fn fires(&self) -> bool {
        matches!(self, Decision::Fire { .. })
    }
}

pub struct Detector {
    policy: DetectionPolicy,
    state: Mutex<DetectionState>,
}

impl Detector {
    pub fn new(policy: DetectionPolicy) -> Self {
        let state = DetectionState {
            current_label: policy.negative_label.clone(),
            last_alert_at: None,
            alerts_fired: 0,
            alerts_suppressed: 0,
        };
        Self {
            policy,
            state: Mutex::new(state),
        }
    }

    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Apply threshold and cooldown to one classifier output observed at `now`.
    pub fn observe(&self, confidence: Confidence, now: Instant) -> Result<Decision, PipelineError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PipelineError::Poisoned("detector state"))?;

        if confidence.value() < self.policy.threshold {
            state.current_label = self.policy.negative_label.clone();
            return Ok(Decision::Negative);
        }

        state.current_label = self.policy.positive_label.clone();
        if let Some(last) = state.last_alert_at {
            // Saturates to zero if a late task observes an older instant.
            let elapsed = now.saturating_duration_since(last);
            if elapsed <= self.policy.cooldown {
                state.alerts_suppressed += 1;
                return Ok(Decision::Suppressed {
                    label: self.policy.positive_label.clone(),
                    remaining: self.policy.cooldown - elapsed,
                });
            }
        }

        // Reaching here implies now > last + cooldown, so this never regresses.
        state.last_alert_at = Some(now);
        state.alerts_fired += 1;
        Ok(Decision::Fire {
            label: self.policy.positive_label.clone(),
        })
    }

    pub fn current_label(&self) -> Result<String, PipelineError> {
        Ok(self.state()?.current_label)
    }

    pub fn state(&self) -> Result<DetectionState, PipelineError> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| PipelineError::Poisoned("detector state"))
    }
}
