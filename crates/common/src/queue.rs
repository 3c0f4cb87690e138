//! Unbounded single-producer, single-consumer async queue.
//!
//! The producer pushes values and eventually closes the queue; the consumer
//! pulls one value at a time. The queue is an explicit state machine:
//!
//! - `buffer`: values pushed but not yet consumed (FIFO)
//! - `waiter`: the waker of a consumer suspended on an empty buffer
//! - `closed`: set once, never cleared
//!
//! Closing does not discard the backlog. A consumer drains every buffered
//! value and only then observes the end of the queue.

use std::{
    collections::VecDeque,
    future::{Future, poll_fn},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

use futures::Stream;

struct State<T> {
    buffer: VecDeque<T>,
    waiter: Option<Waker>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a connected sender/receiver pair.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buffer: VecDeque::new(),
            waiter: None,
            closed: false,
        }),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

/// Producing half. Dropping it closes the queue.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    /// Hand a value to the consumer.
    ///
    /// Wakes a suspended consumer, otherwise buffers. Returns `false` (and
    /// drops the value) when the queue is already closed.
    pub fn push(&self, value: T) -> bool {
        let waiter = {
            let mut state = self.shared.lock();
            if state.closed {
                return false;
            }
            state.buffer.push_back(value);
            state.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
        true
    }

    /// Mark the queue closed and wake a suspended consumer.
    ///
    /// Idempotent. Values already buffered stay readable.
    pub fn close(&self) {
        let waiter = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consuming half.
///
/// Not `Clone`, and [`next`](Self::next) borrows it mutably, so at most one
/// pull can be outstanding at a time.
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueReceiver<T> {
    /// Pull the next value, suspending while the buffer is empty.
    ///
    /// Resolves to `None` once the queue is closed and fully drained.
    pub fn next(&mut self) -> impl Future<Output = Option<T>> + '_ {
        poll_fn(move |cx| self.poll_recv(cx))
    }

    /// Take a buffered value without suspending.
    pub fn try_next(&mut self) -> Option<T> {
        self.shared.lock().buffer.pop_front()
    }

    /// Number of values waiting to be consumed.
    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` once the producer has closed the queue (values may still be buffered).
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut state = self.shared.lock();
        if let Some(value) = state.buffer.pop_front() {
            return Poll::Ready(Some(value));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        state.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        // Nobody will read again: refuse further pushes and free the backlog.
        let mut state = self.shared.lock();
        state.closed = true;
        state.waiter = None;
        state.buffer.clear();
    }
}

impl<T> Stream for QueueReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}
