//! Alert evidence persistence and delivery.
//!
//! When the detector fires, an `AlertJob` is built from a copy of the frame
//! buffer. The `AlertDispatcher` runs the job on its own bounded pool:
//! - split the evidence into segments of at most `max_chunk_frames`
//! - encode each segment as `{label}_{timestamp}_part{N}`
//! - deliver each segment, then one summary notification per job
//!
//! Failures are per segment: logged, counted, and never abort the rest of
//! the job or the pipeline.

mod dispatcher;
mod encoder;
mod job;
mod notify;
#[cfg(feature = "notify-webhook")]
mod webhook;

pub use dispatcher::{AlertDispatcher, DispatchReport, DispatchSettings, DispatchStats};
pub use encoder::{read_segment, ArtifactEncoder, RawSegmentEncoder, SEGMENT_EXTENSION};
pub use job::{artifact_name, chunk_evidence, format_timestamp, AlertJob, ArtifactMetadata};
pub use notify::{AlarmSound, LimitedNotifier, LogNotifier, Notifier, SilentAlarm, TerminalBell};
#[cfg(feature = "notify-webhook")]
pub use webhook::WebhookNotifier;
