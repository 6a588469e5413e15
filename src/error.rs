//! Error taxonomy for the detection pipeline.
//!
//! Only `CaptureError` is fatal to the driver. Everything else is scoped to a
//! single window (`InferenceError`) or a single artifact (`EncodeError`,
//! `DeliveryError`) and is logged and skipped by the caller.

use std::time::Duration;

use thiserror::Error;

/// The frame source is exhausted abnormally or broken.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame source not connected: {0}")]
    NotConnected(String),
    #[error("frame source disconnected: {0}")]
    Disconnected(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame source i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification failed for one window.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("malformed classifier input: {0}")]
    MalformedInput(String),
    #[error("classifier model not loaded")]
    ModelNotLoaded,
    #[error("classifier produced invalid output: {0}")]
    InvalidOutput(String),
    #[error("classification exceeded {limit:?} (took {elapsed:?})")]
    TimedOut { limit: Duration, elapsed: Duration },
    #[error("classifier backend failed: {0}")]
    Backend(String),
}

/// Writing one evidence segment failed.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("refusing to encode an empty segment")]
    EmptySegment,
    #[error("segment is not a valid evidence file: {0}")]
    Corrupt(String),
    #[error("segment i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("segment metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Delivering one notification or artifact failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("notification limit of {limit} reached")]
    LimitReached { limit: u32 },
    #[error("delivery endpoint rejected request with status {status}")]
    Rejected { status: u16 },
    #[error("delivery transport failed: {0}")]
    Transport(String),
    #[error("artifact unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}
