mod support;

use glasses_kernel::dispatch::{AsyncTaskExecutor, RaceOutcome};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn slow_action_loses_to_timeout_exactly_once() {
    support::init_logging();
    let executor = AsyncTaskExecutor::new();
    let timeouts = Arc::new(AtomicUsize::new(0));
    let saw_timeout = Arc::new(AtomicBool::new(false));

    let counter = Arc::clone(&timeouts);
    let flag = Arc::clone(&saw_timeout);
    let race = executor
        .run_off_thread_with_timeout(
            move |guard| {
                thread::sleep(Duration::from_secs(1));
                flag.store(guard.is_timed_out(), Ordering::SeqCst);
                assert!(!guard.complete());
            },
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(50),
        )
        .expect("start race");

    thread::sleep(Duration::from_millis(300));
    assert_eq!(race.outcome(), RaceOutcome::TimedOut);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);

    assert_eq!(race.join(), RaceOutcome::TimedOut);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert!(saw_timeout.load(Ordering::SeqCst));
}

#[test]
fn panicking_raced_action_still_times_out() {
    support::init_logging();
    let executor = AsyncTaskExecutor::new();
    let timeouts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&timeouts);

    let race = executor
        .run_off_thread_with_timeout(
            |_| panic!("release crashed"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(50),
        )
        .expect("start race");

    assert_eq!(race.join(), RaceOutcome::TimedOut);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(executor.take_faults(), vec!["release crashed".to_string()]);
}

#[test]
fn tasks_from_many_threads_run_one_at_a_time() {
    support::init_logging();
    let executor = Arc::new(AsyncTaskExecutor::new());
    let active = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));
    let done = Arc::new(Mutex::new(0usize));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let active = Arc::clone(&active);
            let overlap = Arc::clone(&overlap);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..5 {
                    let active = Arc::clone(&active);
                    let overlap = Arc::clone(&overlap);
                    let done = Arc::clone(&done);
                    executor
                        .run_off_thread(move || {
                            if active.fetch_add(1, Ordering::SeqCst) > 0 {
                                overlap.store(true, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_millis(1));
                            active.fetch_sub(1, Ordering::SeqCst);
                            *done.lock().unwrap() += 1;
                        })
                        .expect("enqueue");
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(executor.flush(Duration::from_secs(5)));
    assert_eq!(*done.lock().unwrap(), 20);
    assert!(!overlap.load(Ordering::SeqCst));
}
