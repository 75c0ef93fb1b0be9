//! Round-robin scheduler: a plain FIFO of ready threads.

use super::trait_def::Scheduler;
use crate::sched::table::MAX_THREAD_NUM;
use crate::thread::ThreadId;
use std::collections::VecDeque;

/// First-in first-out ready queue.
///
/// A thread goes to the tail whenever it becomes ready, so every ready thread
/// runs once before any thread runs twice.
#[derive(Debug)]
pub struct RoundRobinScheduler {
    queue: VecDeque<ThreadId>,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::with_capacity(MAX_THREAD_NUM),
        }
    }
}

impl Default for RoundRobinScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RoundRobinScheduler {
    fn enqueue(&mut self, id: ThreadId) {
        debug_assert!(!self.contains(id), "thread {} queued twice", id);
        self.queue.push_back(id);
    }

    fn pick_next(&mut self) -> Option<ThreadId> {
        self.queue.pop_front()
    }

    fn remove(&mut self, id: ThreadId) -> bool {
        match self.queue.iter().position(|&queued| queued == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: ThreadId) -> bool {
        self.queue.contains(&id)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn ready_ids(&self) -> Vec<ThreadId> {
        self.queue.iter().copied().collect()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}
