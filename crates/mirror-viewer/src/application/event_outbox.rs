//! EventOutbox: unbounded FIFO of UI events waiting to be written.
//!
//! Producers (input handlers on the UI thread) call [`EventOutbox::push`].
//! The single writer thread calls [`EventOutbox::pop_blocking`], which parks
//! on a condition variable while the queue is empty instead of spinning.
//!
//! Closing the outbox is part of connection teardown: unsent events are
//! discarded, the writer wakes up with `None`, and later pushes are dropped.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use mirror_core::UiEvent;
use tracing::trace;

#[derive(Debug, Default)]
struct OutboxState {
    queue: VecDeque<UiEvent>,
    closed: bool,
}

/// Thread-safe queue of outbound [`UiEvent`]s shared through an `Arc`.
#[derive(Debug, Default)]
pub struct EventOutbox {
    state: Mutex<OutboxState>,
    ready: Condvar,
}

impl EventOutbox {
    /// Creates an empty, open outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and wakes the writer.
    ///
    /// Returns `false` if the outbox is closed and the event was dropped.
    pub fn push(&self, event: UiEvent) -> bool {
        let mut state = self.lock();
        if state.closed {
            trace!("outbox closed, dropping {event}");
            return false;
        }
        state.queue.push_back(event);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Removes the oldest event without waiting.
    pub fn try_pop(&self) -> Option<UiEvent> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.queue.pop_front()
    }

    /// Removes the oldest event, blocking while the outbox is empty.
    ///
    /// Returns `None` once the outbox has been closed.
    pub fn pop_blocking(&self) -> Option<UiEvent> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(event) = state.queue.pop_front() {
                return Some(event);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the outbox, discarding queued events and waking every waiter.
    ///
    /// Returns the number of events discarded.  Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let discarded = state.queue.len();
        state.queue.clear();
        drop(state);
        self.ready.notify_all();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of events waiting to be written.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::UiEventType;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn click(x: i32) -> UiEvent {
        UiEvent::new(UiEventType::LeftButtonDown, 0, x, 1, 7)
    }

    #[test]
    fn test_push_then_pop_preserves_fifo_order() {
        // Arrange
        let outbox = EventOutbox::new();
        for x in 1..=3 {
            outbox.push(click(x));
        }

        // Act
        let popped: Vec<i32> = std::iter::from_fn(|| outbox.try_pop()).map(|e| e.x).collect();

        // Assert
        assert_eq!(popped, vec![1, 2, 3]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_try_pop_on_empty_outbox_returns_none() {
        let outbox = EventOutbox::new();
        assert_eq!(outbox.try_pop(), None);
    }

    #[test]
    fn test_pop_blocking_wakes_when_event_pushed_from_other_thread() {
        // Arrange
        let outbox = Arc::new(EventOutbox::new());
        let producer = Arc::clone(&outbox);

        // Act
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(click(42));
        });
        let event = outbox.pop_blocking();
        handle.join().unwrap();

        // Assert
        assert_eq!(event.map(|e| e.x), Some(42));
    }

    #[test]
    fn test_close_wakes_blocked_consumer_with_none() {
        let outbox = Arc::new(EventOutbox::new());
        let consumer = {
            let outbox = Arc::clone(&outbox);
            thread::spawn(move || outbox.pop_blocking())
        };

        thread::sleep(Duration::from_millis(20));
        outbox.close();

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_discards_unsent_events() {
        let outbox = EventOutbox::new();
        outbox.push(click(1));
        outbox.push(click(2));

        assert_eq!(outbox.close(), 2);
        assert!(outbox.is_empty());
        assert_eq!(outbox.pop_blocking(), None);
    }

    #[test]
    fn test_push_after_close_is_dropped() {
        let outbox = EventOutbox::new();
        outbox.close();

        assert!(!outbox.push(click(1)));
        assert!(outbox.is_closed());
        assert_eq!(outbox.len(), 0);
    }

    #[test]
    fn test_concurrent_producers_lose_no_events() {
        // Arrange
        let outbox = Arc::new(EventOutbox::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let outbox = Arc::clone(&outbox);
                thread::spawn(move || {
                    for i in 0..100 {
                        outbox.push(click(t * 1000 + i));
                    }
                })
            })
            .collect();

        // Act
        for h in handles {
            h.join().unwrap();
        }

        // Assert
        assert_eq!(outbox.len(), 400);
    }
}
