use crate::raytracer::MAX_FRAMES_IN_FLIGHT;

/// Keeps replaced GPU objects alive until the frame that last used them has retired.
///
/// Items pushed during frame `F` are dropped by `flush(F + MAX_FRAMES_IN_FLIGHT)`.
pub struct DestroyQueue<T> {
    slots: [Vec<T>; MAX_FRAMES_IN_FLIGHT],
}

impl<T> DestroyQueue<T> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Vec::new()),
        }
    }

    pub fn push(&mut self, frame: u64, item: T) {
        self.slots[Self::slot(frame)].push(item);
    }

    /// Drops everything queued in the slot `frame` is about to reuse.
    pub fn flush(&mut self, frame: u64) {
        self.slots[Self::slot(frame)].clear();
    }

    pub fn flush_all(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    fn slot(frame: u64) -> usize {
        (frame % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }
}

impl<T> Default for DestroyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
