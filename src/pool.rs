//! Bounded worker pool for off-path work (classification, alert dispatch).
//!
//! A fixed number of worker threads pull boxed tasks from a bounded
//! `sync_channel`. When the queue is full, `OverflowPolicy::Drop` rejects the
//! task immediately and `OverflowPolicy::Block` waits for space.
//!
//! Shutdown never interrupts a running task. `Drain` waits (bounded) for queued
//! and running tasks to finish; `Cancel` discards queued tasks and returns
//! without waiting for running ones.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    Drop,
    Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPolicy {
    Drain { timeout: Duration },
    Cancel,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Drain {
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Queue full under `OverflowPolicy::Drop`.
    Dropped,
    /// Pool already shut down.
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: u64,
    pub dropped: u64,
    pub cancelled: u64,
    pub panicked: u64,
    pub in_flight: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: u64,
    /// Tasks still queued or running when shutdown returned.
    pub abandoned: usize,
    pub timed_out: bool,
}

#[derive(Default)]
struct PoolShared {
    in_flight: Mutex<usize>,
    idle: Condvar,
    cancelled: AtomicBool,
    completed: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    panicked: AtomicU64,
}

impl PoolShared {
    fn finish_one(&self) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }

    fn in_flight(&self) -> usize {
        match self.in_flight.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub struct WorkerPool {
    name: &'static str,
    overflow: OverflowPolicy,
    sender: Mutex<Option<SyncSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Spawn `workers` threads sharing a queue of `queue_depth` pending tasks.
    pub fn new(
        name: &'static str,
        workers: usize,
        queue_depth: usize,
        overflow: OverflowPolicy,
    ) -> std::io::Result<Self> {
        let (tx, rx) = sync_channel::<Task>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(PoolShared::default());
        let mut handles = Vec::with_capacity(workers.max(1));
        for idx in 0..workers.max(1) {
            let rx = rx.clone();
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, idx))
                .spawn(move || worker_loop(name, rx, shared))?;
            handles.push(handle);
        }
        Ok(Self {
            name,
            overflow,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            shared,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn submit<F>(&self, task: F) -> SubmitOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            return SubmitOutcome::Closed;
        };

        {
            let mut in_flight = match self.shared.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *in_flight += 1;
        }

        let task: Task = Box::new(task);
        let sent = match self.overflow {
            OverflowPolicy::Drop => match sender.try_send(task) {
                Ok(()) => SubmitOutcome::Accepted,
                Err(TrySendError::Full(_)) => SubmitOutcome::Dropped,
                Err(TrySendError::Disconnected(_)) => SubmitOutcome::Closed,
            },
            OverflowPolicy::Block => match sender.send(task) {
                Ok(()) => SubmitOutcome::Accepted,
                Err(_) => SubmitOutcome::Closed,
            },
        };
        if sent != SubmitOutcome::Accepted {
            self.shared.finish_one();
        }
        if sent == SubmitOutcome::Dropped {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("{}: queue full, task dropped", self.name);
        }
        sent
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            cancelled: self.shared.skipped.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            in_flight: self.shared.in_flight(),
        }
    }

    /// Stop accepting tasks and apply `policy` to outstanding ones.
    ///
    /// Calling this more than once is harmless; later calls only wait again.
    pub fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let timed_out = match policy {
            ShutdownPolicy::Cancel => {
                self.shared.cancelled.store(true, Ordering::SeqCst);
                false
            }
            ShutdownPolicy::Drain { timeout } => !self.wait_idle(timeout),
        };

        if timed_out {
            log::warn!(
                "{}: drain timed out with {} task(s) outstanding; cancelling queue",
                self.name,
                self.shared.in_flight()
            );
            self.shared.cancelled.store(true, Ordering::SeqCst);
        }

        let abandoned = self.shared.in_flight();
        if abandoned == 0 {
            // Workers exit once the channel is closed and empty.
            if let Ok(mut workers) = self.workers.lock() {
                for handle in workers.drain(..) {
                    if handle.join().is_err() {
                        log::error!("{}: worker thread panicked", self.name);
                    }
                }
            }
        }

        ShutdownReport {
            completed: self.shared.completed.load(Ordering::Relaxed),
            abandoned,
            timed_out,
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = match self.shared.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            in_flight = match self.shared.idle.wait_timeout(in_flight, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; running tasks finish detached.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

fn worker_loop(name: &'static str, rx: Arc<Mutex<Receiver<Task>>>, shared: Arc<PoolShared>) {
    loop {
        let task = {
            let Ok(guard) = rx.lock() else {
                log::error!("{}: task queue lock poisoned", name);
                return;
            };
            match guard.recv() {
                Ok(task) => task,
                Err(_) => return,
            }
        };

        if shared.cancelled.load(Ordering::SeqCst) {
            shared.skipped.fetch_add(1, Ordering::Relaxed);
            shared.finish_one();
            continue;
        }

        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            shared.panicked.fetch_add(1, Ordering::Relaxed);
            log::error!("{}: task panicked", name);
        } else {
            shared.completed.fetch_add(1, Ordering::Relaxed);
        }
        shared.finish_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;

    #[test]
    fn drain_runs_every_accepted_task() {
        let pool = WorkerPool::new("test", 2, 16, OverflowPolicy::Block).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            assert_eq!(
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                SubmitOutcome::Accepted
            );
        }
        let report = pool.shutdown(ShutdownPolicy::Drain {
            timeout: Duration::from_secs(5),
        });
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(report.completed, 10);
        assert_eq!(report.abandoned, 0);
        assert!(!report.timed_out);
    }

    #[test]
    fn drop_policy_rejects_when_queue_full() {
        let pool = WorkerPool::new("test", 1, 1, OverflowPolicy::Drop).unwrap();
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        pool.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv().unwrap();
        // Worker busy: one slot in the queue, then overflow.
        assert_eq!(pool.submit(|| {}), SubmitOutcome::Accepted);
        assert_eq!(pool.submit(|| {}), SubmitOutcome::Dropped);
        assert_eq!(pool.stats().dropped, 1);
        release_tx.send(()).unwrap();
        let report = pool.shutdown(ShutdownPolicy::Drain {
            timeout: Duration::from_secs(5),
        });
        assert_eq!(report.completed, 2);
    }

    #[test]
    fn submit_after_shutdown_is_closed() {
        let pool = WorkerPool::new("test", 1, 1, OverflowPolicy::Drop).unwrap();
        pool.shutdown(ShutdownPolicy::Cancel);
        assert_eq!(pool.submit(|| {}), SubmitOutcome::Closed);
    }

    #[test]
    fn cancel_skips_queued_but_lets_running_finish() {
        let pool = WorkerPool::new("test", 1, 4, OverflowPolicy::Drop).unwrap();
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let ran_queued = Arc::new(AtomicBool::new(false));
        {
            let finished = finished.clone();
            pool.submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                finished.store(true, Ordering::SeqCst);
            });
        }
        started_rx.recv().unwrap();
        {
            let ran_queued = ran_queued.clone();
            pool.submit(move || ran_queued.store(true, Ordering::SeqCst));
        }
        let report = pool.shutdown(ShutdownPolicy::Cancel);
        assert_eq!(report.abandoned, 2);
        release_tx.send(()).unwrap();
        // A drain afterwards observes the running task completing and the queued one skipped.
        let report = pool.shutdown(ShutdownPolicy::Drain {
            timeout: Duration::from_secs(5),
        });
        assert_eq!(report.abandoned, 0);
        assert!(finished.load(Ordering::SeqCst));
        assert!(!ran_queued.load(Ordering::SeqCst));
        assert_eq!(pool.stats().cancelled, 1);
    }

    #[test]
    fn drain_times_out_on_stuck_task() {
        let pool = WorkerPool::new("test", 1, 1, OverflowPolicy::Drop).unwrap();
        let (release_tx, release_rx) = channel::<()>();
        pool.submit(move || {
            let _ = release_rx.recv();
        });
        let report = pool.shutdown(ShutdownPolicy::Drain {
            timeout: Duration::from_millis(50),
        });
        assert!(report.timed_out);
        assert_eq!(report.abandoned, 1);
        release_tx.send(()).unwrap();
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::new("test", 1, 4, OverflowPolicy::Block).unwrap();
        pool.submit(|| panic!("boom"));
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = ran.clone();
            pool.submit(move || ran.store(true, Ordering::SeqCst));
        }
        pool.shutdown(ShutdownPolicy::Drain {
            timeout: Duration::from_secs(5),
        });
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(pool.stats().panicked, 1);
    }
}
