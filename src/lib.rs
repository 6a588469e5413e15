//! Behavior Sentinel
//!
//! Watches a single camera stream for a target behavior and, when it is seen,
//! persists and delivers the recent footage as evidence.
//!
//! # Architecture
//!
//! Per frame, on the capture thread:
//!
//! 1. **Capture**: a `FrameSource` yields the next frame.
//! 2. **Buffer**: the frame enters a bounded FIFO covering the last N seconds.
//! 3. **Extract**: a `FeatureExtractor` maps the frame to pose landmarks, or to
//!    nothing when no body is visible.
//! 4. **Window**: landmarks accumulate into fixed-size, non-overlapping windows.
//!
//! Off the capture thread, on bounded worker pools:
//!
//! 5. **Classify**: each window yields a confidence in `[0, 1]`.
//! 6. **Debounce**: threshold and cooldown decide whether an alert fires.
//! 7. **Dispatch**: on fire, a buffer snapshot is split into segments, written
//!    to disk, and delivered through a `Notifier`.
//!
//! # Module Structure
//!
//! - `frame`: frames and the retention-bounded `FrameBuffer`
//! - `ingest`: frame sources (synthetic camera, image directories)
//! - `pose`, `window`: feature extraction and window aggregation
//! - `classify`: window classifiers (motion energy, ONNX via tract)
//! - `detector`: threshold + cooldown debouncing
//! - `alert`: evidence segments, notifiers, the alert dispatcher
//! - `pool`: bounded worker pools with drain/cancel shutdown
//! - `pipeline`: the per-frame driver tying it together
//! - `config`: file + environment configuration

pub mod alert;
pub mod classify;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod pool;
pub mod pose;
pub mod window;

pub use alert::{
    AlarmSound, AlertDispatcher, AlertJob, ArtifactEncoder, DispatchSettings, LimitedNotifier,
    LogNotifier, Notifier, RawSegmentEncoder, SilentAlarm, TerminalBell,
};
pub use classify::{build_classifier, Classifier, ClassifierSettings, Confidence};
pub use config::SentinelConfig;
pub use detector::{Decision, DetectionPolicy, Detector};
pub use error::{CaptureError, DeliveryError, EncodeError, InferenceError, PipelineError};
pub use frame::{Frame, FrameBuffer, PixelFormat, MAX_BUFFER_FRAMES};
pub use ingest::{open_source, FrameSource, SourceSettings, SyntheticConfig, SyntheticSource};
pub use pipeline::{
    LogStatusSink, PipelineComponents, PipelineDriver, PipelineSettings, RunSummary, StatusSink,
    StopReason,
};
pub use pool::{OverflowPolicy, ShutdownPolicy, SubmitOutcome, WorkerPool};
pub use pose::{FeatureExtractor, FeatureVector, Landmark, SyntheticPoseExtractor};
pub use window::{Window, WindowAggregator};
