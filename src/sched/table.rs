//! The thread table: a fixed arena of control blocks indexed by thread id.

use crate::errors::{IdError, ThreadResult};
use crate::thread::{Thread, ThreadId};

/// Number of slots in the thread table, the main thread included.
pub const MAX_THREAD_NUM: usize = 100;

pub struct ThreadTable {
    slots: Vec<Option<Box<Thread>>>,
}

impl ThreadTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_THREAD_NUM);
        slots.resize_with(MAX_THREAD_NUM, || None);
        Self { slots }
    }

    /// Lowest free id that a spawned thread may take. Slot 0 belongs to the
    /// main thread and is never handed out.
    pub fn lowest_free(&self) -> Option<ThreadId> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.is_none())
            .map(|(index, _)| ThreadId::new(index))
    }

    /// Check that `id` is in range and names a live thread.
    pub fn validate(&self, id: ThreadId) -> ThreadResult<()> {
        match self.slots.get(id.get()) {
            None => Err(IdError::OutOfRange(id.get()).into()),
            Some(None) => Err(IdError::NoSuchThread(id.get()).into()),
            Some(Some(_)) => Ok(()),
        }
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.validate(id).is_ok()
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.slots.get(id.get())?.as_deref()
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.slots.get_mut(id.get())?.as_deref_mut()
    }

    /// Put `thread` into the slot matching its id.
    ///
    /// The slot must be in range and empty.
    pub fn insert(&mut self, thread: Box<Thread>) {
        let slot = &mut self.slots[thread.id().get()];
        debug_assert!(slot.is_none(), "thread slot {} already taken", thread.id());
        *slot = Some(thread);
    }

    /// Empty the slot for `id`, handing back its control block.
    pub fn remove(&mut self, id: ThreadId) -> Option<Box<Thread>> {
        self.slots.get_mut(id.get())?.take()
    }

    /// Number of live threads.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live threads in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.slots.iter().filter_map(|slot| slot.as_deref())
    }

    /// Empty every slot, handing back the control blocks in id order.
    pub fn drain(&mut self) -> impl Iterator<Item = Box<Thread>> + '_ {
        self.slots.iter_mut().filter_map(Option::take)
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}
