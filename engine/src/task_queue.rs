//! Per-object FIFO serialization of async tasks.
//!
//! Exactly one task per queue is active at a time. The active task holds a
//! [`Baton`]; when it settles (or is dropped) the baton passes to the oldest
//! waiter. A task's place in line is taken when [`TaskQueue::enqueue`] is
//! called, not when its future is first polled.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Default)]
struct QueueInner {
    active: bool,
    waiting: VecDeque<oneshot::Sender<Baton>>,
}

/// FIFO queue of async tasks bound to one object.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<QueueInner>>,
}

enum Ticket {
    Ready(Baton),
    Waiting(oneshot::Receiver<Baton>),
}

/// Permission to run. Dropping it hands the queue to the next waiter.
struct Baton {
    queue: Arc<Mutex<QueueInner>>,
}

impl Drop for Baton {
    fn drop(&mut self) {
        let next = {
            let mut inner = self.queue.lock();
            let next = inner.waiting.pop_front();
            if next.is_none() {
                inner.active = false;
            }
            next
        };
        if let Some(waiter) = next {
            // A waiter that gave up returns the baton, which drops and
            // moves on to the one after it.
            let _ = waiter.send(Baton {
                queue: Arc::clone(&self.queue),
            });
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after every previously enqueued task has settled.
    ///
    /// The returned future resolves with the task's own output, success or
    /// failure alike. Tasks on other queues are unaffected.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.reserve();
        async move {
            let _baton = match ticket {
                Ticket::Ready(baton) => Some(baton),
                Ticket::Waiting(rx) => rx.await.ok(),
            };
            task().await
        }
    }

    fn reserve(&self) -> Ticket {
        let mut inner = self.inner.lock();
        if inner.active {
            let (tx, rx) = oneshot::channel();
            inner.waiting.push_back(tx);
            Ticket::Waiting(rx)
        } else {
            inner.active = true;
            Ticket::Ready(Baton {
                queue: Arc::clone(&self.inner),
            })
        }
    }

    /// Number of tasks enqueued and not yet settled, including the active one.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.waiting.len() + usize::from(inner.active)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}
