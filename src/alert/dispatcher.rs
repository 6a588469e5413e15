use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::pool::{OverflowPolicy, PoolStats, ShutdownPolicy, ShutdownReport, SubmitOutcome, WorkerPool};

use super::encoder::{write_sidecar, ArtifactEncoder};
use super::job::{artifact_name, chunk_evidence, format_timestamp, AlertJob, ArtifactMetadata};
use super::notify::{AlarmSound, Notifier};

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub output_dir: PathBuf,
    /// Upper bound on frames per persisted segment.
    pub max_chunk_frames: usize,
    /// Frame rate recorded in segment headers.
    pub fps: u32,
    /// Concurrent dispatch jobs.
    pub workers: usize,
    /// Jobs waiting for a worker before overflow applies.
    pub queue_depth: usize,
    pub overflow: OverflowPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("video_segments"),
            max_chunk_frames: 300,
            fps: 30,
            workers: 2,
            queue_depth: 4,
            overflow: OverflowPolicy::Drop,
        }
    }
}

/// Result of processing one alert job.
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    pub job_id: u64,
    pub parts: usize,
    /// Segments written to disk, in part order.
    pub artifacts: Vec<PathBuf>,
    /// 1-based parts successfully delivered.
    pub delivered: Vec<usize>,
    /// 1-based parts that failed to encode or deliver.
    pub failed: Vec<usize>,
    pub summary_sent: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub jobs_completed: u64,
    pub artifacts_written: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub pool: PoolStats,
}

#[derive(Default)]
struct Counters {
    jobs_completed: AtomicU64,
    artifacts_written: AtomicU64,
    deliveries_ok: AtomicU64,
    deliveries_failed: AtomicU64,
}

struct DispatchContext {
    settings: DispatchSettings,
    encoder: Box<dyn ArtifactEncoder>,
    notifier: Arc<dyn Notifier>,
    alarm: Arc<dyn AlarmSound>,
    counters: Counters,
}

/// Runs alert jobs on a dedicated bounded pool so persistence and network
/// delivery never block frame capture.
pub struct AlertDispatcher {
    ctx: Arc<DispatchContext>,
    pool: WorkerPool,
}

impl AlertDispatcher {
    pub fn new(
        settings: DispatchSettings,
        encoder: Box<dyn ArtifactEncoder>,
        notifier: Arc<dyn Notifier>,
        alarm: Arc<dyn AlarmSound>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!(
                "failed to create alert output dir {}",
                settings.output_dir.display()
            )
        })?;
        let pool = WorkerPool::new(
            "alert-dispatch",
            settings.workers,
            settings.queue_depth,
            settings.overflow,
        )
        .context("failed to spawn alert dispatch workers")?;
        Ok(Self {
            ctx: Arc::new(DispatchContext {
                settings,
                encoder,
                notifier,
                alarm,
                counters: Counters::default(),
            }),
            pool,
        })
    }

    /// Queue a job without waiting for it.
    pub fn dispatch(&self, job: AlertJob) -> SubmitOutcome {
        let job_id = job.id;
        let ctx = self.ctx.clone();
        let outcome = self.pool.submit(move || {
            ctx.process(job);
        });
        if outcome != SubmitOutcome::Accepted {
            log::warn!("alert job {} not dispatched: {:?}", job_id, outcome);
        }
        outcome
    }

    /// Process a job on the calling thread.
    pub fn process_now(&self, job: AlertJob) -> DispatchReport {
        self.ctx.process(job)
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.ctx.counters;
        DispatchStats {
            jobs_completed: c.jobs_completed.load(Ordering::Relaxed),
            artifacts_written: c.artifacts_written.load(Ordering::Relaxed),
            deliveries_ok: c.deliveries_ok.load(Ordering::Relaxed),
            deliveries_failed: c.deliveries_failed.load(Ordering::Relaxed),
            pool: self.pool.stats(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.ctx.settings.output_dir
    }

    /// Stop accepting jobs. Jobs already running always finish with their evidence.
    pub fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport {
        self.pool.shutdown(policy)
    }
}

impl DispatchContext {
    fn process(&self, job: AlertJob) -> DispatchReport {
        let chunks = chunk_evidence(&job.evidence, self.settings.max_chunk_frames);
        let mut report = DispatchReport {
            job_id: job.id,
            parts: chunks.len(),
            ..DispatchReport::default()
        };

        if !self.alarm.is_busy() {
            if let Err(e) = self.alarm.play() {
                log::warn!("alert job {}: alarm failed: {}", job.id, e);
            }
        }

        let title = format!("Alert: {} detected", job.label);
        let body = format!(
            "{} detected at {} (confidence {:.2}); {} frame(s) of evidence in {} segment(s)",
            job.label,
            format_timestamp(job.created_at),
            job.confidence,
            job.evidence.len(),
            chunks.len()
        );
        match self.notifier.notify(&title, &body) {
            Ok(()) => report.summary_sent = true,
            Err(e) => log::warn!("alert job {}: summary notification failed: {}", job.id, e),
        }

        for (idx, chunk) in chunks.iter().enumerate() {
            let part = idx + 1;
            let name = artifact_name(&job.label, job.created_at, part);
            let path = self
                .settings
                .output_dir
                .join(format!("{}.{}", name, self.encoder.extension()));

            let bytes = match self.encoder.encode(chunk, self.settings.fps, &path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("alert job {}: encoding part {} failed: {}", job.id, part, e);
                    self.counters.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                    report.failed.push(part);
                    continue;
                }
            };
            self.counters.artifacts_written.fetch_add(1, Ordering::Relaxed);
            report.artifacts.push(path.clone());

            let metadata = ArtifactMetadata {
                name,
                job_id: job.id,
                label: job.label.clone(),
                confidence: job.confidence,
                part,
                total_parts: chunks.len(),
                frame_count: chunk.len(),
                first_sequence: chunk.first().map(|f| f.sequence),
                last_sequence: chunk.last().map(|f| f.sequence),
                first_captured_at: chunk.first().map(|f| format_timestamp(f.captured_at)),
                last_captured_at: chunk.last().map(|f| format_timestamp(f.captured_at)),
                fps: self.settings.fps,
                bytes,
            };
            if let Err(e) = write_sidecar(&path, &metadata) {
                log::warn!("alert job {}: sidecar for part {} failed: {}", job.id, part, e);
            }

            match self.notifier.deliver(&path, &metadata) {
                Ok(()) => {
                    self.counters.deliveries_ok.fetch_add(1, Ordering::Relaxed);
                    report.delivered.push(part);
                }
                Err(e) => {
                    log::warn!(
                        "alert job {}: delivery of {} failed: {}",
                        job.id,
                        path.display(),
                        e
                    );
                    self.counters.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                    report.failed.push(part);
                }
            }
        }

        self.counters.jobs_completed.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "alert job {} done: {} part(s), {} delivered, {} failed",
            job.id,
            report.parts,
            report.delivered.len(),
            report.failed.len()
        );
        report
    }
}
