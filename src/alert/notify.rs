use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::error::DeliveryError;

use super::job::ArtifactMetadata;

/// Outbound notification channel.
///
/// `notify` sends a short text note, `deliver` transfers one artifact file.
/// Both are best effort: the dispatcher logs failures and moves on. Callers
/// that need retries should wrap their notifier.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError>;

    fn deliver(&self, artifact: &Path, metadata: &ArtifactMetadata) -> Result<(), DeliveryError>;
}

/// Notifier that only writes to the log. Default when no transport is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        log::warn!("{}: {}", title, body);
        Ok(())
    }

    fn deliver(&self, artifact: &Path, metadata: &ArtifactMetadata) -> Result<(), DeliveryError> {
        if !artifact.is_file() {
            return Err(DeliveryError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", artifact.display()),
            )));
        }
        log::info!(
            "artifact {} ({}/{}, {} frames, {} bytes) at {}",
            metadata.name,
            metadata.part,
            metadata.total_parts,
            metadata.frame_count,
            metadata.bytes,
            artifact.display()
        );
        Ok(())
    }
}

/// Caps the total number of notes and deliveries passed to the inner notifier.
///
/// Once the budget is spent every call fails with `DeliveryError::LimitReached`.
pub struct LimitedNotifier<N> {
    inner: N,
    limit: u32,
    used: AtomicU32,
    exhausted_logged: AtomicBool,
}

impl<N: Notifier> LimitedNotifier<N> {
    pub fn new(inner: N, limit: u32) -> Self {
        Self {
            inner,
            limit,
            used: AtomicU32::new(0),
            exhausted_logged: AtomicBool::new(false),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    fn take_one(&self) -> Result<(), DeliveryError> {
        let taken = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            });
        match taken {
            Ok(used) => {
                if used + 1 == self.limit {
                    log::warn!(
                        "{}: notification limit of {} reached; further alerts are not sent",
                        self.inner.name(),
                        self.limit
                    );
                    self.exhausted_logged.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(_) => {
                if !self.exhausted_logged.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "{}: notification limit of {} reached",
                        self.inner.name(),
                        self.limit
                    );
                }
                Err(DeliveryError::LimitReached { limit: self.limit })
            }
        }
    }
}

impl<N: Notifier> Notifier for LimitedNotifier<N> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        self.take_one()?;
        self.inner.notify(title, body)
    }

    fn deliver(&self, artifact: &Path, metadata: &ArtifactMetadata) -> Result<(), DeliveryError> {
        self.take_one()?;
        self.inner.deliver(artifact, metadata)
    }
}

/// Local audible alarm.
///
/// The dispatcher checks `is_busy` before `play` so overlapping alerts do not
/// stack sounds.
pub trait AlarmSound: Send + Sync {
    fn is_busy(&self) -> bool;

    fn play(&self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SilentAlarm;

impl AlarmSound for SilentAlarm {
    fn is_busy(&self) -> bool {
        false
    }

    fn play(&self) -> Result<()> {
        Ok(())
    }
}

/// Rings the terminal bell on stderr and reports busy for `duration` afterwards.
pub struct TerminalBell {
    duration: Duration,
    started: Mutex<Option<Instant>>,
}

impl TerminalBell {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: Mutex::new(None),
        }
    }
}

impl AlarmSound for TerminalBell {
    fn is_busy(&self) -> bool {
        match self.started.lock() {
            Ok(started) => started.is_some_and(|at| at.elapsed() < self.duration),
            Err(_) => false,
        }
    }

    fn play(&self) -> Result<()> {
        let mut started = self
            .started
            .lock()
            .map_err(|_| anyhow!("alarm lock poisoned"))?;
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        *started = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        notes: AtomicUsize,
    }

    impl Notifier for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn notify(&self, _title: &str, _body: &str) -> Result<(), DeliveryError> {
            self.notes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn deliver(&self, _artifact: &Path, _metadata: &ArtifactMetadata) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[test]
    fn limited_notifier_stops_after_budget() {
        let limited = LimitedNotifier::new(Counting::default(), 2);
        assert!(limited.notify("a", "b").is_ok());
        assert!(limited.notify("a", "b").is_ok());
        assert!(matches!(
            limited.notify("a", "b"),
            Err(DeliveryError::LimitReached { limit: 2 })
        ));
        assert_eq!(limited.inner.notes.load(Ordering::SeqCst), 2);
        assert_eq!(limited.remaining(), 0);
    }

    #[test]
    fn terminal_bell_is_busy_right_after_play() {
        let bell = TerminalBell::new(Duration::from_secs(60));
        assert!(!bell.is_busy());
        bell.play().unwrap();
        assert!(bell.is_busy());
        let short = TerminalBell::new(Duration::ZERO);
        short.play().unwrap();
        assert!(!short.is_busy());
    }

    #[test]
    fn log_notifier_rejects_missing_artifact() {
        let meta = ArtifactMetadata {
            name: "x".to_string(),
            job_id: 1,
            label: "aggression".to_string(),
            confidence: 0.9,
            part: 1,
            total_parts: 1,
            frame_count: 0,
            first_sequence: None,
            last_sequence: None,
            first_captured_at: None,
            last_captured_at: None,
            fps: 30,
            bytes: 0,
        };
        assert!(LogNotifier
            .deliver(Path::new("/nonexistent/segment.bseg"), &meta)
            .is_err());
    }
}
