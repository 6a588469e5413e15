//! Per-frame pipeline driver.
//!
//! One synchronous loop runs at frame rate:
//! capture -> buffer -> (warm-up gate) -> extract -> window.
//! Each completed window becomes a task on the classification pool, which
//! classifies, debounces, and on fire snapshots the frame buffer into an
//! `AlertJob` for the dispatcher. Neither inference nor delivery ever runs on
//! the capture thread.
//!
//! The classification pool has one worker per classifier instance, so
//! inference runs in parallel up to the number of instances supplied.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::alert::{AlertDispatcher, AlertJob};
use crate::classify::{Classifier, Confidence};
use crate::detector::{Decision, Detector};
use crate::error::{CaptureError, InferenceError, PipelineError};
use crate::frame::{Frame, FrameBuffer};
use crate::ingest::FrameSource;
use crate::pool::{OverflowPolicy, ShutdownPolicy, ShutdownReport, SubmitOutcome, WorkerPool};
use crate::pose::FeatureExtractor;
use crate::window::{Window, WindowAggregator};

/// Receives the latest frame and label, e.g. for an on-screen overlay.
pub trait StatusSink: Send {
    fn update(&mut self, frame: &Frame, label: &str);
}

/// Logs label transitions.
#[derive(Default)]
pub struct LogStatusSink {
    last: Option<String>,
}

impl StatusSink for LogStatusSink {
    fn update(&mut self, frame: &Frame, label: &str) {
        if self.last.as_deref() != Some(label) {
            log::info!("label: {} (frame {})", label, frame.sequence);
            self.last = Some(label.to_string());
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub buffer_capacity: usize,
    pub window_size: usize,
    /// Frames buffered but not analysed at start-up while the camera settles.
    pub warm_up_frames: u64,
    pub classify_queue_depth: usize,
    pub classify_overflow: OverflowPolicy,
    /// Results whose inference call took longer than this are discarded.
    pub classify_timeout: Option<Duration>,
    /// A `Drain` timeout is one deadline shared by both pools.
    pub shutdown: ShutdownPolicy,
    pub health_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 300,
            window_size: crate::window::DEFAULT_WINDOW_SIZE,
            warm_up_frames: 60,
            classify_queue_depth: 8,
            classify_overflow: OverflowPolicy::Drop,
            classify_timeout: None,
            shutdown: ShutdownPolicy::default(),
            health_interval: Duration::from_secs(5),
        }
    }
}

/// Collaborators injected into the driver.
pub struct PipelineComponents {
    pub source: Box<dyn FrameSource>,
    pub extractor: Box<dyn FeatureExtractor>,
    /// One instance per classification worker; must not be empty.
    pub classifiers: Vec<Box<dyn Classifier>>,
    pub detector: Arc<Detector>,
    pub dispatcher: Arc<AlertDispatcher>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub frames: u64,
    pub windows: u64,
    pub windows_dropped: u64,
    pub inference_failures: u64,
    pub alerts_fired: u64,
    pub alerts_suppressed: u64,
    pub alerts_not_dispatched: u64,
    pub partial_window_len: usize,
    pub classify_shutdown: ShutdownReport,
    pub dispatch_shutdown: ShutdownReport,
}

#[derive(Default)]
struct Counters {
    windows_dropped: AtomicU64,
    inference_failures: AtomicU64,
    alerts_fired: AtomicU64,
    alerts_suppressed: AtomicU64,
    alerts_not_dispatched: AtomicU64,
}

/// Idle classifier instances. A task checks one out for the duration of a
/// single inference call.
struct ClassifierSlots {
    idle: Mutex<Vec<Box<dyn Classifier>>>,
    returned: Condvar,
}

impl ClassifierSlots {
    fn checkout(&self) -> Result<CheckedOut<'_>, InferenceError> {
        let poisoned = || InferenceError::Backend("classifier slots lock poisoned".to_string());
        let mut idle = self.idle.lock().map_err(|_| poisoned())?;
        loop {
            if let Some(classifier) = idle.pop() {
                return Ok(CheckedOut {
                    slots: self,
                    classifier: Some(classifier),
                });
            }
            idle = self.returned.wait(idle).map_err(|_| poisoned())?;
        }
    }
}

/// Returns the classifier to its slot on drop, including on panic.
struct CheckedOut<'a> {
    slots: &'a ClassifierSlots,
    classifier: Option<Box<dyn Classifier>>,
}

impl CheckedOut<'_> {
    fn classify(&mut self, window: &Window) -> Result<Confidence, InferenceError> {
        match self.classifier.as_mut() {
            Some(classifier) => classifier.classify(window),
            None => Err(InferenceError::ModelNotLoaded),
        }
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        if let Some(classifier) = self.classifier.take() {
            let mut idle = match self.slots.idle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            idle.push(classifier);
            self.slots.returned.notify_one();
        }
    }
}

/// State shared with classification tasks.
struct WindowTaskContext {
    classifiers: ClassifierSlots,
    detector: Arc<Detector>,
    dispatcher: Arc<AlertDispatcher>,
    buffer: Arc<Mutex<FrameBuffer>>,
    timeout: Option<Duration>,
    counters: Counters,
}

pub struct PipelineDriver {
    /// Released when the run loop ends.
    source: Option<Box<dyn FrameSource>>,
    extractor: Box<dyn FeatureExtractor>,
    aggregator: WindowAggregator,
    buffer: Arc<Mutex<FrameBuffer>>,
    ctx: Arc<WindowTaskContext>,
    classify_pool: WorkerPool,
    sink: Option<Box<dyn StatusSink>>,
    stop: Arc<AtomicBool>,
    settings: PipelineSettings,
}

impl PipelineDriver {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> anyhow::Result<Self> {
        if components.classifiers.is_empty() {
            anyhow::bail!("pipeline needs at least one classifier instance");
        }
        let buffer = Arc::new(Mutex::new(FrameBuffer::new(settings.buffer_capacity)));
        let classify_pool = WorkerPool::new(
            "classify",
            components.classifiers.len(),
            settings.classify_queue_depth,
            settings.classify_overflow,
        )?;
        let ctx = Arc::new(WindowTaskContext {
            classifiers: ClassifierSlots {
                idle: Mutex::new(components.classifiers),
                returned: Condvar::new(),
            },
            detector: components.detector,
            dispatcher: components.dispatcher,
            buffer: buffer.clone(),
            timeout: settings.classify_timeout,
            counters: Counters::default(),
        });
        Ok(Self {
            source: Some(components.source),
            extractor: components.extractor,
            aggregator: WindowAggregator::new(settings.window_size),
            buffer,
            ctx,
            classify_pool,
            sink: None,
            stop: Arc::new(AtomicBool::new(false)),
            settings,
        })
    }

    pub fn with_status_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Flag that ends the run after the current frame when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Shared handle on the evidence buffer.
    pub fn frame_buffer(&self) -> Arc<Mutex<FrameBuffer>> {
        self.buffer.clone()
    }

    /// Run until end of stream, a stop signal, or a capture error.
    ///
    /// On every exit path the frame source is released first, then the
    /// classification and dispatch pools are shut down per the configured
    /// policy before returning. A driver runs at most once.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let mut source = self.source.take().ok_or_else(|| {
            PipelineError::Capture(CaptureError::NotConnected(
                "frame source already released".to_string(),
            ))
        })?;
        let mut frames = 0u64;
        let mut fatal = None;
        let mut stop_reason = StopReason::Stopped;
        let mut last_health = Instant::now();

        match source.connect() {
            Ok(()) => loop {
                if self.stop.load(Ordering::SeqCst) {
                    log::info!("stop requested");
                    break;
                }
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        log::info!("end of stream after {} frames", frames);
                        stop_reason = StopReason::EndOfStream;
                        break;
                    }
                    Err(e) => {
                        log::error!("capture failed: {}", e);
                        fatal = Some(PipelineError::Capture(e));
                        break;
                    }
                };
                frames += 1;
                if let Err(e) = self.process_frame(frame, frames) {
                    log::error!("pipeline failed: {}", e);
                    fatal = Some(e);
                    break;
                }

                if last_health.elapsed() >= self.settings.health_interval {
                    self.log_health(source.as_ref(), frames);
                    last_health = Instant::now();
                }
            },
            Err(e) => {
                log::error!("frame source connect failed: {}", e);
                fatal = Some(PipelineError::Capture(e));
            }
        }

        log::info!("releasing frame source {}", source.stats().url);
        drop(source);

        let summary = self.shutdown(stop_reason, frames);
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn process_frame(&mut self, frame: Frame, index: u64) -> Result<(), PipelineError> {
        self.buffer
            .lock()
            .map_err(|_| PipelineError::Poisoned("frame buffer"))?
            .push(frame.clone());

        if index > self.settings.warm_up_frames {
            let features = self.extractor.extract(&frame);
            if let Some(window) = self.aggregator.observe(features) {
                log::debug!("window {} complete at frame {}", window.sequence(), frame.sequence);
                self.submit_window(window);
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            let label = self.ctx.detector.current_label()?;
            sink.update(&frame, &label);
        }
        Ok(())
    }

    fn submit_window(&self, window: Window) {
        let ctx = self.ctx.clone();
        let sequence = window.sequence();
        let outcome = self.classify_pool.submit(move || ctx.handle_window(window));
        if outcome != SubmitOutcome::Accepted {
            self.ctx
                .counters
                .windows_dropped
                .fetch_add(1, Ordering::Relaxed);
            log::warn!("window {} not classified: {:?}", sequence, outcome);
        }
    }

    fn log_health(&self, source: &dyn FrameSource, frames: u64) {
        let (buffered, kb) = match self.buffer.lock() {
            Ok(buf) => (buf.len(), buf.memory_bytes() / 1024),
            Err(_) => (0, 0),
        };
        let classify = self.classify_pool.stats();
        let dispatch = self.ctx.dispatcher.stats();
        log::info!(
            "source health={} frames={} buffer={} frames (~{} KB) classify_in_flight={} dispatch_in_flight={}",
            source.is_healthy(),
            frames,
            buffered,
            kb,
            classify.in_flight,
            dispatch.pool.in_flight
        );
    }

    fn shutdown(&mut self, stop_reason: StopReason, frames: u64) -> RunSummary {
        let deadline = match self.settings.shutdown {
            ShutdownPolicy::Drain { timeout } => Some(Instant::now() + timeout),
            ShutdownPolicy::Cancel => None,
        };
        let classify_shutdown = self.classify_pool.shutdown(self.settings.shutdown);
        // The dispatcher gets whatever is left of the shared drain deadline.
        let dispatch_policy = match deadline {
            Some(deadline) => ShutdownPolicy::Drain {
                timeout: deadline.saturating_duration_since(Instant::now()),
            },
            None => ShutdownPolicy::Cancel,
        };
        let dispatch_shutdown = self.ctx.dispatcher.shutdown(dispatch_policy);
        let partial = self.aggregator.pending_len();
        if partial > 0 {
            log::debug!(
                "discarding partial window ({} of {} vectors)",
                partial,
                self.aggregator.size()
            );
        }

        let c = &self.ctx.counters;
        let summary = RunSummary {
            stop_reason,
            frames,
            windows: self.aggregator.windows_emitted(),
            windows_dropped: c.windows_dropped.load(Ordering::Relaxed),
            inference_failures: c.inference_failures.load(Ordering::Relaxed),
            alerts_fired: c.alerts_fired.load(Ordering::Relaxed),
            alerts_suppressed: c.alerts_suppressed.load(Ordering::Relaxed),
            alerts_not_dispatched: c.alerts_not_dispatched.load(Ordering::Relaxed),
            partial_window_len: partial,
            classify_shutdown,
            dispatch_shutdown,
        };
        log::info!(
            "pipeline stopped ({:?}): frames={} windows={} alerts={} suppressed={} inference_failures={}",
            summary.stop_reason,
            summary.frames,
            summary.windows,
            summary.alerts_fired,
            summary.alerts_suppressed,
            summary.inference_failures
        );
        summary
    }
}

impl WindowTaskContext {
    fn handle_window(&self, window: Window) {
        let result = self.classifiers.checkout().and_then(|mut classifier| {
            // Timed from checkout so queueing for an instance never counts.
            let started = Instant::now();
            let confidence = classifier.classify(&window)?;
            let elapsed = started.elapsed();
            match self.timeout {
                Some(limit) if elapsed > limit => Err(InferenceError::TimedOut { limit, elapsed }),
                _ => Ok(confidence),
            }
        });
        let confidence = match result {
            Ok(confidence) => confidence,
            Err(e) => {
                self.counters.inference_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("window {} discarded: {}", window.sequence(), e);
                return;
            }
        };

        let decision = match self.detector.observe(confidence, Instant::now()) {
            Ok(decision) => decision,
            Err(e) => {
                log::error!("window {}: {}", window.sequence(), e);
                return;
            }
        };
        match decision {
            Decision::Negative => {}
            Decision::Suppressed { label, remaining } => {
                self.counters.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "{} (confidence {:.2}) inside cooldown, {:?} remaining",
                    label,
                    confidence.value(),
                    remaining
                );
            }
            Decision::Fire { label } => {
                self.counters.alerts_fired.fetch_add(1, Ordering::Relaxed);
                let evidence = match self.buffer.lock() {
                    Ok(buf) => buf.snapshot(),
                    Err(_) => {
                        log::error!("frame buffer lock poisoned; alert sent without evidence");
                        Vec::new()
                    }
                };
                log::warn!(
                    "ALERT: {} detected (confidence {:.2}), {} frame(s) of evidence",
                    label,
                    confidence.value(),
                    evidence.len()
                );
                let job = AlertJob::new(label, confidence.value(), evidence);
                if self.dispatcher.dispatch(job) != SubmitOutcome::Accepted {
                    self.counters
                        .alerts_not_dispatched
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
