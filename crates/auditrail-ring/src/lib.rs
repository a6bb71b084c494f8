//! Fixed-capacity, FIFO, thread-safe queue of event handles (spec.md §4.3).
//!
//! Backed by `crossbeam_queue::ArrayQueue`, a lock-free bounded SPSC/MPMC
//! ring buffer: O(1) push/pop with no per-operation allocation, matching the
//! "bounded lock-free-ish handoff" called for in spec.md §1.

use auditrail_core::AuditrailError;
use crossbeam_queue::ArrayQueue;

pub struct BoundedRing<T> {
    queue: ArrayQueue<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    /// Construct a ring of fixed `capacity`. Fails with `InvalidInput` when
    /// `capacity` is not positive (spec.md §4.3).
    pub fn new(capacity: usize) -> Result<Self, AuditrailError> {
        if capacity == 0 {
            return Err(AuditrailError::InvalidInput(
                "ring capacity must be positive".into(),
            ));
        }
        Ok(Self {
            queue: ArrayQueue::new(capacity),
            capacity,
        })
    }

    /// Push `item`. Returns `Err(item)` (caller should treat as `BufferFull`)
    /// when the ring is at capacity.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.queue.push(item)
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn cap(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_capacity() {
        assert!(matches!(
            BoundedRing::<u32>::new(0),
            Err(AuditrailError::InvalidInput(_))
        ));
    }

    #[test]
    fn fifo_order_preserved() {
        let ring: BoundedRing<u32> = BoundedRing::new(4).unwrap();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        ring.push(3).unwrap();
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let ring: BoundedRing<u32> = BoundedRing::new(1).unwrap();
        ring.push(1).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.push(2), Err(2));
    }

    #[test]
    fn len_and_cap_track_state() {
        let ring: BoundedRing<u32> = BoundedRing::new(2).unwrap();
        assert_eq!(ring.cap(), 2);
        assert!(ring.is_empty());
        ring.push(1).unwrap();
        assert_eq!(ring.len(), 1);
        assert!(!ring.is_empty());
    }
}
