//! sentineld - behavior sentinel daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source (synthetic camera or image directory)
//! 2. Keeps the last N seconds in a bounded evidence buffer
//! 3. Classifies fixed-size pose windows off the capture thread
//! 4. Debounces positives with threshold + cooldown
//! 5. Writes and delivers evidence segments when an alert fires

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use behavior_sentinel::{
    build_classifier, open_source, AlarmSound, AlertDispatcher, Detector, LimitedNotifier,
    LogNotifier, LogStatusSink, Notifier, PipelineComponents, PipelineDriver, RawSegmentEncoder,
    SentinelConfig, SilentAlarm, SyntheticPoseExtractor, TerminalBell,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect a target behavior on a camera stream and deliver evidence clips"
)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source (`stub://name` or an image directory).
    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    fps: Option<u32>,

    /// Confidence at or above which a window counts as positive.
    #[arg(long)]
    threshold: Option<f32>,

    /// Minimum seconds between alerts.
    #[arg(long)]
    cooldown: Option<u64>,

    /// Directory for evidence segments.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Ring the terminal bell on each alert.
    #[arg(long)]
    bell: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SentinelConfig::load_from(args.config.as_deref())?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;

    log::info!(
        "sentineld {} source={} fps={} buffer={} frames ({}s) window={} threshold={} cooldown={}s",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.source.fps,
        cfg.buffer_capacity(),
        cfg.retention.as_secs(),
        cfg.window_size,
        cfg.detection.threshold,
        cfg.detection.cooldown.as_secs()
    );

    let source = open_source(&cfg.source)?;
    let classifier_settings = cfg.classifier_settings();
    let classifiers = (0..cfg.classifier.max_in_flight)
        .map(|_| build_classifier(&classifier_settings))
        .collect::<Result<Vec<_>>>()?;
    let detector = Arc::new(Detector::new(cfg.detection.clone()));

    let alarm: Arc<dyn AlarmSound> = if args.bell {
        Arc::new(TerminalBell::new(Duration::from_secs(2)))
    } else {
        Arc::new(SilentAlarm)
    };
    let dispatcher = Arc::new(AlertDispatcher::new(
        cfg.dispatch_settings(),
        Box::new(RawSegmentEncoder),
        build_notifier(&cfg)?,
        alarm,
    )?);
    log::info!(
        "evidence segments written to {}",
        dispatcher.output_dir().display()
    );

    let components = PipelineComponents {
        source,
        extractor: Box::new(SyntheticPoseExtractor::new()),
        classifiers,
        detector,
        dispatcher,
    };
    let mut driver = PipelineDriver::new(components, cfg.pipeline_settings())?
        .with_status_sink(Box::new(LogStatusSink::default()));

    let stop = driver.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let summary = driver.run()?;
    log::info!(
        "sentineld exiting: frames={} windows={} dropped_windows={} alerts={} suppressed={} undispatched={}",
        summary.frames,
        summary.windows,
        summary.windows_dropped,
        summary.alerts_fired,
        summary.alerts_suppressed,
        summary.alerts_not_dispatched
    );
    if summary.classify_shutdown.timed_out || summary.dispatch_shutdown.timed_out {
        log::warn!(
            "shutdown timed out: {} classification and {} alert jobs abandoned",
            summary.classify_shutdown.abandoned,
            summary.dispatch_shutdown.abandoned
        );
    }
    Ok(())
}

fn apply_args(cfg: &mut SentinelConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.source.url = source.clone();
    }
    if let Some(fps) = args.fps {
        cfg.source.fps = fps;
    }
    if let Some(threshold) = args.threshold {
        cfg.detection.threshold = threshold;
    }
    if let Some(cooldown) = args.cooldown {
        cfg.detection.cooldown = Duration::from_secs(cooldown);
    }
    if let Some(out) = &args.out {
        cfg.alert.output_dir = out.clone();
    }
    if args.max_frames.is_some() {
        cfg.source.max_frames = args.max_frames;
    }
}

fn build_notifier(cfg: &SentinelConfig) -> Result<Arc<dyn Notifier>> {
    #[cfg(feature = "notify-webhook")]
    if let Some(url) = &cfg.alert.webhook_url {
        let webhook = behavior_sentinel::alert::WebhookNotifier::new(url)?;
        log::info!("delivering alerts to webhook {}", url);
        return Ok(limited(webhook, cfg.alert.notification_limit));
    }
    #[cfg(not(feature = "notify-webhook"))]
    if cfg.alert.webhook_url.is_some() {
        return Err(anyhow!(
            "webhook delivery requires the notify-webhook feature"
        ));
    }
    Ok(limited(LogNotifier, cfg.alert.notification_limit))
}

fn limited<N: Notifier + 'static>(notifier: N, limit: Option<u32>) -> Arc<dyn Notifier> {
    match limit {
        Some(limit) => Arc::new(LimitedNotifier::new(notifier, limit)),
        None => Arc::new(notifier),
    }
}
