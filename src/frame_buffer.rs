use parking_lot::Mutex;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 3;

/// Bounded FIFO shared between the detection and fetch routes.
///
/// Neither side ever waits: a full buffer rejects new items and an empty
/// buffer answers `None` straight away.
#[derive(Debug)]
pub struct FrameBuffer<T> {
    slots: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> FrameBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends `item` unless the buffer is full, in which case it is dropped.
    pub fn try_put(&self, item: T) -> bool {
        let mut slots = self.slots.lock();
        if slots.len() >= self.capacity {
            return false;
        }
        slots.push_back(item);
        true
    }

    /// Removes the oldest item, if any.
    pub fn try_get(&self) -> Option<T> {
        self.slots.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
