//! Actions posted from any thread and drained once per frame on the thread
//! that owns `C`.

use crate::lock_unpoisoned;
use std::sync::{Arc, Mutex};

pub type MainThreadAction<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

struct Delayed<C> {
    due: f64,
    action: MainThreadAction<C>,
}

struct Inner<C> {
    immediate: Mutex<Vec<MainThreadAction<C>>>,
    delayed: Mutex<Vec<Delayed<C>>>,
    /// Seconds accumulated from frame deltas. Never wall-clock time.
    clock: Mutex<f64>,
}

pub struct MainThreadQueue<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for MainThreadQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for MainThreadQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MainThreadQueue<C> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                immediate: Mutex::new(Vec::new()),
                delayed: Mutex::new(Vec::new()),
                clock: Mutex::new(0.0),
            }),
        }
    }

    pub fn run_on_main_thread<F>(&self, action: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        lock_unpoisoned(&self.inner.immediate).push(Box::new(action));
    }

    /// Runs `action` on the first drain at least `delay_seconds` of frame time
    /// from now. A non-positive delay behaves like [`Self::run_on_main_thread`].
    pub fn run_on_main_thread_after<F>(&self, action: F, delay_seconds: f64)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if delay_seconds <= 0.0 {
            self.run_on_main_thread(action);
            return;
        }
        let due = self.now() + delay_seconds;
        lock_unpoisoned(&self.inner.delayed).push(Delayed {
            due,
            action: Box::new(action),
        });
    }

    pub fn now(&self) -> f64 {
        *lock_unpoisoned(&self.inner.clock)
    }

    pub fn advance(&self, delta_seconds: f64) {
        if delta_seconds > 0.0 {
            *lock_unpoisoned(&self.inner.clock) += delta_seconds;
        }
    }

    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.inner.immediate).len() + lock_unpoisoned(&self.inner.delayed).len()
    }

    /// Removes everything runnable now: immediate actions first, then due
    /// delayed actions, each group in posting order. Actions posted while the
    /// returned batch runs wait for the next drain.
    pub fn take_due(&self) -> Vec<MainThreadAction<C>> {
        let mut due: Vec<MainThreadAction<C>> =
            std::mem::take(&mut *lock_unpoisoned(&self.inner.immediate));

        let now = self.now();
        let mut delayed = lock_unpoisoned(&self.inner.delayed);
        let (ready, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *delayed).into_iter().partition(|d| d.due <= now);
        *delayed = waiting;
        due.extend(ready.into_iter().map(|d| d.action));
        due
    }

    /// Advances the clock by `delta_seconds` and runs every due action on `ctx`.
    pub fn drain(&self, ctx: &mut C, delta_seconds: f64) -> usize {
        self.advance(delta_seconds);
        let batch = self.take_due();
        let count = batch.len();
        for action in batch {
            action(ctx);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_actions_run_before_delayed_ones() {
        let queue: MainThreadQueue<Vec<&'static str>> = MainThreadQueue::new();
        queue.run_on_main_thread_after(|log| log.push("delayed"), 0.1);
        queue.run_on_main_thread(|log| log.push("first"));
        queue.run_on_main_thread(|log| log.push("second"));

        let mut log = Vec::new();
        assert_eq!(queue.drain(&mut log, 0.0), 2);
        assert_eq!(log, vec!["first", "second"]);

        assert_eq!(queue.drain(&mut log, 0.05), 0);
        assert_eq!(queue.drain(&mut log, 0.05), 1);
        assert_eq!(log, vec!["first", "second", "delayed"]);
    }

    #[test]
    fn posts_from_other_threads_arrive_on_drain() {
        let queue: MainThreadQueue<u32> = MainThreadQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || queue.run_on_main_thread(|n| *n += 1))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let mut n = 0;
        queue.drain(&mut n, 0.016);
        assert_eq!(n, 4);
    }

    #[test]
    fn action_posted_during_drain_waits_for_next_frame() {
        let queue: MainThreadQueue<Vec<u8>> = MainThreadQueue::new();
        let again = queue.clone();
        queue.run_on_main_thread(move |log| {
            log.push(1);
            again.run_on_main_thread(|log| log.push(2));
        });
        let mut log = Vec::new();
        queue.drain(&mut log, 0.0);
        assert_eq!(log, vec![1]);
        queue.drain(&mut log, 0.0);
        assert_eq!(log, vec![1, 2]);
    }
}
