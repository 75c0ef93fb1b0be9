//! Scheduler trait definition.

use crate::thread::ThreadId;

/// Ready-queue policy.
///
/// The kernel keeps the invariant that an id is queued exactly when its
/// thread is ready; implementations only decide the order. Every method is
/// called with the preemption signal masked and the kernel state locked.
pub trait Scheduler: Send {
    /// Add a thread that has become ready to run.
    ///
    /// This is called when a thread is spawned, resumed after blocking, or
    /// preempted.
    fn enqueue(&mut self, id: ThreadId);

    /// Remove and return the thread to run next, or `None` if nothing is
    /// ready.
    fn pick_next(&mut self) -> Option<ThreadId>;

    /// Drop `id` from the queue. Returns whether it was queued.
    fn remove(&mut self, id: ThreadId) -> bool;

    fn contains(&self, id: ThreadId) -> bool;

    /// Number of queued threads.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued ids in dispatch order.
    fn ready_ids(&self) -> Vec<ThreadId>;

    /// Forget every queued id.
    fn clear(&mut self);
}
