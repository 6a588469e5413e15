use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::DispatchSettings;
use crate::classify::ClassifierSettings;
use crate::detector::{
    DetectionPolicy, DEFAULT_NEGATIVE_LABEL, DEFAULT_POSITIVE_LABEL, DEFAULT_THRESHOLD,
};
use crate::frame::{capacity_for, MAX_BUFFER_FRAMES};
use crate::ingest::SourceSettings;
use crate::pipeline::PipelineSettings;
use crate::pool::{OverflowPolicy, ShutdownPolicy};
use crate::pose::POSE_FEATURE_LEN;
use crate::window::DEFAULT_WINDOW_SIZE;

const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_RETENTION_SECS: u64 = 10;
const DEFAULT_WARM_UP_FRAMES: u64 = 60;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_CLASSIFIER: &str = "motion-energy";
const DEFAULT_CLASSIFY_WORKERS: usize = 2;
const DEFAULT_CLASSIFY_QUEUE: usize = 8;
const DEFAULT_OUTPUT_DIR: &str = "video_segments";
const DEFAULT_ALERT_WORKERS: usize = 2;
const DEFAULT_ALERT_QUEUE: usize = 4;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    source: Option<SourceConfigFile>,
    buffer: Option<BufferConfigFile>,
    window: Option<WindowConfigFile>,
    detection: Option<DetectionConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    alert: Option<AlertConfigFile>,
    shutdown: Option<ShutdownConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct BufferConfigFile {
    retention_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct WindowConfigFile {
    size: Option<usize>,
    warm_up_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    threshold: Option<f32>,
    cooldown_secs: Option<u64>,
    positive_label: Option<String>,
    negative_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    max_in_flight: Option<usize>,
    queue_depth: Option<usize>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    output_dir: Option<PathBuf>,
    max_chunk_frames: Option<usize>,
    max_in_flight: Option<usize>,
    queue_depth: Option<usize>,
    overflow: Option<String>,
    notification_limit: Option<u32>,
    webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ShutdownConfigFile {
    policy: Option<String>,
    drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub source: SourceSettings,
    pub retention: Duration,
    pub window_size: usize,
    pub warm_up_frames: u64,
    pub detection: DetectionPolicy,
    pub classifier: ClassifierConfig,
    pub alert: AlertConfig,
    pub shutdown: ShutdownPolicy,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub max_in_flight: usize,
    pub queue_depth: usize,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub output_dir: PathBuf,
    /// `None` means one buffer-full per segment.
    pub max_chunk_frames: Option<usize>,
    pub max_in_flight: usize,
    pub queue_depth: usize,
    pub overflow: OverflowPolicy,
    pub notification_limit: Option<u32>,
    pub webhook_url: Option<String>,
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let window = file.window.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let shutdown = file.shutdown.unwrap_or_default();

        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            fps: source_file.fps.unwrap_or(DEFAULT_FPS),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            max_frames: source_file.max_frames,
            pace: true,
        };
        let retention = Duration::from_secs(
            file.buffer
                .and_then(|buffer| buffer.retention_secs)
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );
        let detection = DetectionPolicy {
            threshold: detection.threshold.unwrap_or(DEFAULT_THRESHOLD),
            cooldown: Duration::from_secs(
                detection.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
            ),
            positive_label: detection
                .positive_label
                .unwrap_or_else(|| DEFAULT_POSITIVE_LABEL.to_string()),
            negative_label: detection
                .negative_label
                .unwrap_or_else(|| DEFAULT_NEGATIVE_LABEL.to_string()),
        };
        let classifier = ClassifierConfig {
            backend: classifier
                .backend
                .unwrap_or_else(|| DEFAULT_CLASSIFIER.to_string()),
            model_path: classifier.model_path,
            max_in_flight: classifier.max_in_flight.unwrap_or(DEFAULT_CLASSIFY_WORKERS),
            queue_depth: classifier.queue_depth.unwrap_or(DEFAULT_CLASSIFY_QUEUE),
            timeout: classifier.timeout_ms.map(Duration::from_millis),
        };
        let alert = AlertConfig {
            output_dir: alert
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            max_chunk_frames: alert.max_chunk_frames,
            max_in_flight: alert.max_in_flight.unwrap_or(DEFAULT_ALERT_WORKERS),
            queue_depth: alert.queue_depth.unwrap_or(DEFAULT_ALERT_QUEUE),
            overflow: match alert.overflow.as_deref() {
                Some(value) => parse_overflow(value)?,
                None => OverflowPolicy::Drop,
            },
            notification_limit: alert.notification_limit,
            webhook_url: alert.webhook_url,
        };
        let drain_timeout = Duration::from_secs(
            shutdown
                .drain_timeout_secs
                .unwrap_or(DEFAULT_DRAIN_TIMEOUT_SECS),
        );
        let shutdown = match shutdown.policy.as_deref() {
            Some(value) => parse_shutdown(value, drain_timeout)?,
            None => ShutdownPolicy::Drain {
                timeout: drain_timeout,
            },
        };

        Ok(Self {
            source,
            retention,
            window_size: window.size.unwrap_or(DEFAULT_WINDOW_SIZE),
            warm_up_frames: window.warm_up_frames.unwrap_or(DEFAULT_WARM_UP_FRAMES),
            detection,
            classifier,
            alert,
            shutdown,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTINEL_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Some(fps) = env_number::<u32>("SENTINEL_FPS")? {
            self.source.fps = fps;
        }
        if let Some(secs) = env_number::<u64>("SENTINEL_RETENTION_SECS")? {
            self.retention = Duration::from_secs(secs);
        }
        if let Some(size) = env_number::<usize>("SENTINEL_WINDOW_SIZE")? {
            self.window_size = size;
        }
        if let Some(threshold) = env_number::<f32>("SENTINEL_THRESHOLD")? {
            self.detection.threshold = threshold;
        }
        if let Some(secs) = env_number::<u64>("SENTINEL_COOLDOWN_SECS")? {
            self.detection.cooldown = Duration::from_secs(secs);
        }
        if let Some(frames) = env_number::<usize>("SENTINEL_MAX_CHUNK_FRAMES")? {
            self.alert.max_chunk_frames = Some(frames);
        }
        if let Ok(dir) = std::env::var("SENTINEL_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.alert.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.alert.webhook_url = Some(url);
            }
        }
        if let Ok(policy) = std::env::var("SENTINEL_SHUTDOWN_POLICY") {
            let timeout = match self.shutdown {
                ShutdownPolicy::Drain { timeout } => timeout,
                ShutdownPolicy::Cancel => Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            };
            self.shutdown = parse_shutdown(&policy, timeout)?;
        }
        Ok(())
    }

    /// Re-check invariants after programmatic overrides (e.g. CLI flags).
    pub fn validate(&self) -> Result<()> {
        if self.source.fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        if self.retention.as_secs() == 0 {
            return Err(anyhow!("buffer retention must be at least one second"));
        }
        let wanted = u64::from(self.source.fps).saturating_mul(self.retention.as_secs());
        if wanted > MAX_BUFFER_FRAMES as u64 {
            return Err(anyhow!(
                "buffer of {} fps x {}s = {} frames exceeds the {} frame limit",
                self.source.fps,
                self.retention.as_secs(),
                wanted,
                MAX_BUFFER_FRAMES
            ));
        }
        if self.window_size == 0 {
            return Err(anyhow!("window size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            return Err(anyhow!("detection threshold must be within [0, 1]"));
        }
        if self.detection.positive_label.trim().is_empty()
            || self.detection.negative_label.trim().is_empty()
        {
            return Err(anyhow!("detection labels must not be empty"));
        }
        if self.alert.max_chunk_frames == Some(0) {
            return Err(anyhow!("max chunk frames must be greater than zero"));
        }
        if self.classifier.max_in_flight == 0 || self.alert.max_in_flight == 0 {
            return Err(anyhow!("worker counts must be greater than zero"));
        }
        if self.classifier.queue_depth == 0 || self.alert.queue_depth == 0 {
            return Err(anyhow!("queue depths must be greater than zero"));
        }
        Ok(())
    }

    /// Frames held by the evidence buffer (`fps x retention`).
    pub fn buffer_capacity(&self) -> usize {
        capacity_for(self.source.fps, self.retention)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            buffer_capacity: self.buffer_capacity(),
            window_size: self.window_size,
            warm_up_frames: self.warm_up_frames,
            classify_queue_depth: self.classifier.queue_depth,
            classify_overflow: OverflowPolicy::Drop,
            classify_timeout: self.classifier.timeout,
            shutdown: self.shutdown,
            ..PipelineSettings::default()
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            output_dir: self.alert.output_dir.clone(),
            max_chunk_frames: self
                .alert
                .max_chunk_frames
                .unwrap_or_else(|| self.buffer_capacity()),
            fps: self.source.fps,
            workers: self.alert.max_in_flight,
            queue_depth: self.alert.queue_depth,
            overflow: self.alert.overflow,
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            backend: self.classifier.backend.clone(),
            model_path: self.classifier.model_path.clone(),
            window_size: self.window_size,
            feature_len: POSE_FEATURE_LEN,
        }
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, value)),
        _ => Ok(None),
    }
}

fn parse_overflow(value: &str) -> Result<OverflowPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "drop" => Ok(OverflowPolicy::Drop),
        "block" => Ok(OverflowPolicy::Block),
        other => Err(anyhow!("unknown overflow policy '{}' (drop|block)", other)),
    }
}

fn parse_shutdown(value: &str, drain_timeout: Duration) -> Result<ShutdownPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "drain" => Ok(ShutdownPolicy::Drain {
            timeout: drain_timeout,
        }),
        "cancel" => Ok(ShutdownPolicy::Cancel),
        other => Err(anyhow!("unknown shutdown policy '{}' (drain|cancel)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        assert_eq!(cfg.source.fps, 30);
        assert_eq!(cfg.buffer_capacity(), 300);
        assert_eq!(cfg.window_size, 20);
        assert_eq!(cfg.detection.threshold, 0.5);
        assert_eq!(cfg.detection.cooldown, Duration::from_secs(30));
        assert_eq!(cfg.dispatch_settings().max_chunk_frames, 300);
        assert_eq!(
            cfg.shutdown,
            ShutdownPolicy::Drain {
                timeout: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn validation_rejects_out_of_range_threshold() {
        let mut cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        cfg.detection.threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_buffer_beyond_frame_limit() {
        let mut cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        cfg.source.fps = 30;
        cfg.retention = Duration::from_secs(240);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.buffer_capacity(), 7200);

        cfg.retention = Duration::from_secs(300);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("9000"), "{}", err);
    }

    #[test]
    fn validation_rejects_zero_chunk_and_window() {
        let mut cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        cfg.alert.max_chunk_frames = Some(0);
        assert!(cfg.validate().is_err());
        let mut cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        cfg.window_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!(parse_overflow("BLOCK").unwrap(), OverflowPolicy::Block);
        assert!(parse_overflow("spill").is_err());
        assert_eq!(
            parse_shutdown("Cancel", Duration::from_secs(1)).unwrap(),
            ShutdownPolicy::Cancel
        );
    }
}
