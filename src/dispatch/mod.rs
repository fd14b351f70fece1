//! Off-thread execution for blocking native calls.
//!
//! [`AsyncTaskExecutor`] owns one lazily spawned worker that drains a FIFO
//! queue. [`AsyncTaskExecutor::run_off_thread_with_timeout`] races an action
//! against a timer on dedicated threads so a hung native release cannot block
//! the queue behind it. Results come back through
//! [`main_thread::MainThreadQueue`].

pub mod main_thread;

use crate::lock_unpoisoned;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const WORKER_NAME: &str = "async-task-executor";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("async task executor has shut down")]
    ShutDown,
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    shutdown: AtomicBool,
    pending: AtomicUsize,
    faults: Mutex<Vec<String>>,
}

pub struct AsyncTaskExecutor {
    shared: Arc<Shared>,
    worker: OnceCell<JoinHandle<()>>,
    poll_interval: Duration,
}

impl Default for AsyncTaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncTaskExecutor {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                shutdown: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                faults: Mutex::new(Vec::new()),
            }),
            worker: OnceCell::new(),
            poll_interval,
        }
    }

    /// Queues `action` behind everything already submitted.
    pub fn run_off_thread<F>(&self, action: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }
        self.ensure_worker()?;
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.shared.queue).push_back(Box::new(action));
        Ok(())
    }

    /// Runs `action` and a timer side by side. Exactly one of them wins: if the
    /// timer fires first `on_timeout` runs once and a late completion is
    /// ignored; if the action finishes first the timer does nothing.
    pub fn run_off_thread_with_timeout<F, T>(
        &self,
        action: F,
        on_timeout: T,
        timeout: Duration,
    ) -> Result<TimeoutRace, DispatchError>
    where
        F: FnOnce(&RaceGuard) + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        let state = Arc::new(AtomicU8::new(RaceOutcome::Pending as u8));
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let timer_state = Arc::clone(&state);
        let timer = thread::Builder::new()
            .name("async-race-timer".into())
            .spawn(move || {
                let deadline = Instant::now() + timeout;
                match done_rx.recv_timeout(timeout) {
                    Ok(()) => return,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // The action died without completing; still honour the deadline.
                        thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    }
                }
                if claim(&timer_state, RaceOutcome::TimedOut) {
                    log::info!("[dispatch] action timed out after {timeout:?}");
                    on_timeout();
                }
            })
            .map_err(|source| DispatchError::Spawn {
                name: "async-race-timer",
                source,
            })?;

        let guard = RaceGuard {
            state: Arc::clone(&state),
        };
        let shared = Arc::clone(&self.shared);
        let action = thread::Builder::new()
            .name("async-race-action".into())
            .spawn(move || {
                match panic::catch_unwind(AssertUnwindSafe(|| action(&guard))) {
                    Ok(()) => {
                        if !guard.complete() {
                            log::warn!("[dispatch] action finished after its timeout fired");
                        }
                        let _ = done_tx.send(());
                    }
                    Err(payload) => record_panic(&shared, payload.as_ref()),
                }
            })
            .map_err(|source| DispatchError::Spawn {
                name: "async-race-action",
                source,
            })?;

        Ok(TimeoutRace {
            state,
            action: Some(action),
            timer: Some(timer),
        })
    }

    /// Waits until every queued task has run. Returns `false` on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.pending.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Panic messages from tasks that failed since the last call.
    pub fn take_faults(&self) -> Vec<String> {
        std::mem::take(&mut *lock_unpoisoned(&self.shared.faults))
    }

    /// Stops the worker after the task it is running. Queued tasks are dropped.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    fn ensure_worker(&self) -> Result<(), DispatchError> {
        self.worker.get_or_try_init(|| {
            let shared = Arc::clone(&self.shared);
            let poll_interval = self.poll_interval;
            log::debug!("[dispatch] spawning {WORKER_NAME}");
            thread::Builder::new()
                .name(WORKER_NAME.into())
                .spawn(move || worker_loop(shared, poll_interval))
                .map_err(|source| DispatchError::Spawn {
                    name: WORKER_NAME,
                    source,
                })
        })?;
        Ok(())
    }
}

impl Drop for AsyncTaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, poll_interval: Duration) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        let task = lock_unpoisoned(&shared.queue).pop_front();
        let Some(task) = task else {
            thread::sleep(poll_interval);
            continue;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            record_panic(&shared, payload.as_ref());
        }
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
    log::debug!("[dispatch] {WORKER_NAME} exiting");
}

fn record_panic(shared: &Shared, payload: &(dyn Any + Send)) {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    log::error!("[dispatch] async task panicked: {message}");
    lock_unpoisoned(&shared.faults).push(message);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RaceOutcome {
    Pending = 0,
    Completed = 1,
    TimedOut = 2,
}

impl RaceOutcome {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => RaceOutcome::Completed,
            2 => RaceOutcome::TimedOut,
            _ => RaceOutcome::Pending,
        }
    }
}

fn claim(state: &AtomicU8, outcome: RaceOutcome) -> bool {
    state
        .compare_exchange(
            RaceOutcome::Pending as u8,
            outcome as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
}

/// Handed to a raced action so it can check whether it already lost.
pub struct RaceGuard {
    state: Arc<AtomicU8>,
}

impl RaceGuard {
    /// Claims the race for the action. Returns `false` if the timer won.
    pub fn complete(&self) -> bool {
        claim(&self.state, RaceOutcome::Completed)
            || RaceOutcome::from_raw(self.state.load(Ordering::SeqCst)) == RaceOutcome::Completed
    }

    pub fn is_timed_out(&self) -> bool {
        RaceOutcome::from_raw(self.state.load(Ordering::SeqCst)) == RaceOutcome::TimedOut
    }
}

pub struct TimeoutRace {
    state: Arc<AtomicU8>,
    action: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl TimeoutRace {
    pub fn outcome(&self) -> RaceOutcome {
        RaceOutcome::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Blocks until both the action and the timer have finished.
    pub fn join(mut self) -> RaceOutcome {
        for handle in [self.action.take(), self.timer.take()].into_iter().flatten() {
            if handle.join().is_err() {
                log::error!("[dispatch] race thread panicked");
            }
        }
        self.outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_submission_order() {
        let executor = AsyncTaskExecutor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let sink = Arc::clone(&seen);
            executor
                .run_off_thread(move || sink.lock().unwrap().push(i))
                .expect("enqueue");
        }
        assert!(executor.flush(Duration::from_secs(2)));
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_task_is_recorded_and_worker_survives() {
        let executor = AsyncTaskExecutor::new();
        executor
            .run_off_thread(|| panic!("native call blew up"))
            .expect("enqueue");
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .run_off_thread(move || flag.store(true, Ordering::SeqCst))
            .expect("enqueue");

        assert!(executor.flush(Duration::from_secs(2)));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(executor.take_faults(), vec!["native call blew up".to_string()]);
    }

    #[test]
    fn shut_down_executor_rejects_work() {
        let executor = AsyncTaskExecutor::new();
        executor.shutdown();
        assert!(matches!(
            executor.run_off_thread(|| {}),
            Err(DispatchError::ShutDown)
        ));
    }

    #[test]
    fn fast_action_cancels_timer() {
        let executor = AsyncTaskExecutor::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let race = executor
            .run_off_thread_with_timeout(
                |_| {},
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(200),
            )
            .expect("race");
        assert_eq!(race.join(), RaceOutcome::Completed);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
