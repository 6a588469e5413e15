use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::frame::Frame;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);
static LAST_CREATED_MS: AtomicU64 = AtomicU64::new(0);

/// Wall-clock now, bumped so no two jobs in this process share a millisecond.
/// Artifact names carry millisecond timestamps, so this keeps them distinct.
fn unique_creation_time() -> SystemTime {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let prev = LAST_CREATED_MS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now_ms.max(last + 1))
        })
        .unwrap_or(now_ms);
    UNIX_EPOCH + Duration::from_millis(now_ms.max(prev + 1))
}

/// Evidence for one fired alert. Owns an independent copy of the buffered frames.
#[derive(Clone, Debug)]
pub struct AlertJob {
    pub id: u64,
    pub label: String,
    pub confidence: f32,
    pub created_at: SystemTime,
    pub evidence: Vec<Frame>,
}

impl AlertJob {
    pub fn new(label: impl Into<String>, confidence: f32, evidence: Vec<Frame>) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            confidence,
            created_at: unique_creation_time(),
            evidence,
        }
    }

    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Split evidence into contiguous segments of at most `max_chunk` frames.
///
/// Yields `ceil(len / max_chunk)` segments whose concatenation is the input.
pub fn chunk_evidence(frames: &[Frame], max_chunk: usize) -> Vec<&[Frame]> {
    frames.chunks(max_chunk.max(1)).collect()
}

/// Compact UTC timestamp with millisecond resolution, e.g. `20261016T142501.250Z`.
pub fn format_timestamp(at: SystemTime) -> String {
    let at: DateTime<Utc> = at.into();
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

/// Artifact stem `{label}_{timestamp}_part{part}` with a 1-based part index.
///
/// Label characters outside `[A-Za-z0-9-]` become `-` so the stem is a safe
/// file name.
pub fn artifact_name(label: &str, created_at: SystemTime, part: usize) -> String {
    let label: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let label = if label.is_empty() { "alert".to_string() } else { label };
    format!("{}_{}_part{}", label, format_timestamp(created_at), part)
}

/// Sidecar description of one encoded segment.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ArtifactMetadata {
    pub name: String,
    pub job_id: u64,
    pub label: String,
    pub confidence: f32,
    pub part: usize,
    pub total_parts: usize,
    pub frame_count: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub first_captured_at: Option<String>,
    pub last_captured_at: Option<String>,
    pub fps: u32,
    pub bytes: u64,
}
