//! In-memory FIFO buffer of render tasks.
//!
//! Single-consumer draining semantics: `pop_front` refuses to run
//! while another pop is in flight. The guard is a correctness
//! measure, not an optimization — the controller's drain loop is
//! timer-driven, and an overlapping tick must never observe the same
//! head element twice.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::task::RenderTask;

/// FIFO task queue with a single-flight dequeue guard.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<RenderTask>>,
    pop_in_flight: AtomicBool,
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail. Always succeeds.
    pub fn push(&self, task: RenderTask) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(task);
    }

    /// Remove and return the head element.
    ///
    /// Returns `None` when the queue is empty or when another pop is
    /// already in flight.
    pub fn pop_front(&self) -> Option<RenderTask> {
        if self
            .pop_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        self.pop_in_flight.store(false, Ordering::SeqCst);
        task
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all buffered tasks and reset the single-flight guard.
    ///
    /// Called on controller shutdown so no stale tasks survive a
    /// stop/start cycle.
    pub fn clear(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.pop_in_flight.store(false, Ordering::SeqCst);
    }
}
