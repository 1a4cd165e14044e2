//! MainThreadDispatcher: cross-thread hand-off of work to the UI thread.
//!
//! The network reader runs on its own thread, but frame consumers (texture
//! uploads, scene updates) must run on the host's main thread.  The reader
//! therefore wraps each delivery in a closure and [`schedule`]s it; the host
//! calls [`drain_and_run_once`] once per tick on its main thread.
//!
//! # Drain semantics
//!
//! A drain takes the whole pending list in one swap under the lock and then
//! runs the callbacks with the lock released, in the order they were
//! scheduled.  Callbacks scheduled while a drain is running (including by a
//! callback of that drain) land in the fresh list and run on the next drain.
//! A callback that panics is logged and the rest of the batch still runs.
//!
//! # Consumer thread
//!
//! The first thread to drain becomes the consumer thread for the lifetime of
//! the dispatcher.  Draining from any other thread is rejected with
//! [`DispatchError::WrongThread`].
//!
//! [`schedule`]: MainThreadDispatcher::schedule
//! [`drain_and_run_once`]: MainThreadDispatcher::drain_and_run_once

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::{error, trace};

/// A unit of work queued for the consumer thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Error type for dispatcher operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// A required argument was absent.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The drain was attempted from a thread other than the consumer thread.
    #[error("drain called on {actual:?} but the consumer thread is {expected:?}")]
    WrongThread { expected: ThreadId, actual: ThreadId },
}

/// Queue of callbacks that must run on one designated thread.
#[derive(Default)]
pub struct MainThreadDispatcher {
    pending: Mutex<Vec<Task>>,
    consumer: OnceLock<ThreadId>,
}

impl std::fmt::Debug for MainThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadDispatcher")
            .field("pending", &self.pending())
            .field("consumer", &self.consumer.get())
            .finish()
    }
}

impl MainThreadDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `f` to run on the consumer thread during the next drain.
    ///
    /// Safe to call from any thread.
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push(Box::new(f));
    }

    /// Queues an optional task, rejecting an absent one.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArgument`] if `task` is `None`; nothing
    /// is queued in that case.
    pub fn try_schedule(&self, task: Option<Task>) -> Result<(), DispatchError> {
        let task = task.ok_or(DispatchError::InvalidArgument("callback must not be absent"))?;
        self.lock().push(task);
        Ok(())
    }

    /// Makes the calling thread the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WrongThread`] if another thread is already the
    /// consumer.
    pub fn bind_to_current_thread(&self) -> Result<(), DispatchError> {
        self.check_consumer_thread()
    }

    /// Runs every callback that was pending when the call started.
    ///
    /// Returns the number of callbacks executed (including ones that
    /// panicked).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WrongThread`] if called from a thread other
    /// than the consumer thread; nothing runs in that case.
    pub fn drain_and_run_once(&self) -> Result<usize, DispatchError> {
        self.check_consumer_thread()?;

        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        if count > 0 {
            trace!("draining {count} callbacks");
        }

        for (index, task) in batch.into_iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
                error!(
                    "dispatched callback {index} panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
        Ok(count)
    }

    /// Number of callbacks waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn check_consumer_thread(&self) -> Result<(), DispatchError> {
        let current = thread::current().id();
        let consumer = *self.consumer.get_or_init(|| current);
        if consumer == current {
            Ok(())
        } else {
            Err(DispatchError::WrongThread {
                expected: consumer,
                actual: current,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_tasks = Arc::clone(&log);
        let make = move |n: u32| -> Task {
            let log = Arc::clone(&log_for_tasks);
            Box::new(move || log.lock().unwrap().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_drain_runs_callbacks_in_schedule_order() {
        // Arrange
        let dispatcher = MainThreadDispatcher::new();
        let (log, make) = recorder();
        for n in 1..=3 {
            dispatcher.try_schedule(Some(make(n))).unwrap();
        }

        // Act
        let ran = dispatcher.drain_and_run_once().unwrap();

        // Assert
        assert_eq!(ran, 3);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_second_consecutive_drain_runs_nothing() {
        let dispatcher = MainThreadDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        dispatcher.schedule(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.drain_and_run_once(), Ok(1));
        assert_eq!(dispatcher.drain_and_run_once(), Ok(0));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_scheduled_during_drain_runs_on_next_drain() {
        // Arrange
        let dispatcher = Arc::new(MainThreadDispatcher::new());
        let (log, make) = recorder();
        let inner = make(2);
        let d = Arc::clone(&dispatcher);
        let outer = make(1);
        dispatcher.schedule(move || {
            outer();
            d.schedule(inner);
        });

        // Act
        let first = dispatcher.drain_and_run_once().unwrap();
        let after_first = log.lock().unwrap().clone();
        let second = dispatcher.drain_and_run_once().unwrap();

        // Assert
        assert_eq!((first, second), (1, 1));
        assert_eq!(after_first, vec![1]);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_the_batch() {
        // Arrange
        let dispatcher = MainThreadDispatcher::new();
        let (log, make) = recorder();
        dispatcher.try_schedule(Some(make(1))).unwrap();
        dispatcher.schedule(|| panic!("consumer blew up"));
        dispatcher.try_schedule(Some(make(3))).unwrap();

        // Act
        let ran = dispatcher.drain_and_run_once().unwrap();

        // Assert
        assert_eq!(ran, 3);
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_try_schedule_rejects_absent_callback() {
        let dispatcher = MainThreadDispatcher::new();

        let result = dispatcher.try_schedule(None);

        assert!(matches!(result, Err(DispatchError::InvalidArgument(_))));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_drain_from_non_consumer_thread_is_rejected() {
        // Arrange: this thread becomes the consumer
        let dispatcher = Arc::new(MainThreadDispatcher::new());
        dispatcher.bind_to_current_thread().unwrap();
        dispatcher.schedule(|| {});

        // Act
        let d = Arc::clone(&dispatcher);
        let result = thread::spawn(move || d.drain_and_run_once()).join().unwrap();

        // Assert
        assert!(matches!(result, Err(DispatchError::WrongThread { .. })));
        assert_eq!(dispatcher.pending(), 1, "rejected drain must not run anything");
    }

    #[test]
    fn test_schedule_from_many_threads_then_drain_runs_all() {
        let dispatcher = Arc::new(MainThreadDispatcher::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&dispatcher);
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let c = Arc::clone(&c);
                        d.schedule(move || {
                            c.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(dispatcher.pending(), 400);
        assert_eq!(dispatcher.drain_and_run_once(), Ok(400));
        assert_eq!(counter.load(Ordering::SeqCst), 400);
    }
}
