// src/bot/queue.rs - Drop-oldest holding area for comments awaiting a flush cycle

use log::debug;
use std::sync::{Mutex, MutexGuard};

use crate::types::Comment;

pub const MAX_QUEUE_SIZE: usize = 20;

/// Fixed-capacity buffer. Pushing never blocks and never suspends; when full,
/// the oldest comments are discarded to make room for the newest.
pub struct BoundedQueue {
    items: Mutex<Vec<Comment>>,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a comment, returning how many old comments were evicted to fit it
    pub fn push(&self, comment: Comment) -> usize {
        let mut items = self.lock();
        let mut evicted = 0;

        if items.len() >= self.capacity {
            evicted = items.len() + 1 - self.capacity;
            items.drain(..evicted);
            debug!("Queue full, discarded {} oldest comment(s)", evicted);
        }

        items.push(comment);
        evicted
    }

    /// Swap the buffer for an empty one and hand the previous contents to the caller
    pub fn drain_all(&self) -> Vec<Comment> {
        let mut items = self.lock();
        std::mem::replace(&mut *items, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding this lock cannot leave the Vec half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<Comment>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BoundedQueue {
    fn default() -> Self {
        Self::new(MAX_QUEUE_SIZE)
    }
}
