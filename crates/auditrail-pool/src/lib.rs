//! Reusable `Event` records with reset-on-release (spec.md §4.4).
//!
//! Avoids per-call allocation on the hot path: the interceptor acquires a
//! cleared event, fills it, hands it off through the ring; once the drain
//! loop finishes with it, it is reset and returned to the free list instead
//! of dropped.

use auditrail_core::Event;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Inner {
    free: Mutex<Vec<Box<Event>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cloning an `EventPool` is cheap (shares the same backing free list); the
/// worker holds one and clones it into the interceptor and the drain loop.
#[derive(Clone)]
pub struct EventPool {
    inner: Arc<Inner>,
}

impl EventPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(Vec::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Pre-populate the free list with `n` cleared events.
    pub fn with_capacity(n: usize) -> Self {
        let pool = Self::new();
        let mut free = pool.inner.free.lock().expect("pool mutex poisoned");
        free.extend((0..n).map(|_| Box::new(Event::default())));
        drop(free);
        pool
    }

    /// Acquire a cleared event, growing the pool on miss.
    pub fn acquire(&self) -> PooledEvent {
        let existing = self.inner.free.lock().expect("pool mutex poisoned").pop();
        let event = match existing {
            Some(ev) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                ev
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                Box::new(Event::default())
            }
        };
        PooledEvent {
            event: Some(event),
            pool: self.clone(),
        }
    }

    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    /// Number of cleared events currently sitting in the free list.
    pub fn free_len(&self) -> usize {
        self.inner.free.lock().expect("pool mutex poisoned").len()
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased `Event`. On drop, the event is reset and returned to the pool —
/// release never leaves residue in a returned event (testable property 8).
pub struct PooledEvent {
    event: Option<Box<Event>>,
    pool: EventPool,
}

impl Deref for PooledEvent {
    type Target = Event;
    fn deref(&self) -> &Event {
        self.event.as_ref().expect("event taken before drop")
    }
}

impl DerefMut for PooledEvent {
    fn deref_mut(&mut self) -> &mut Event {
        self.event.as_mut().expect("event taken before drop")
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        if let Some(mut ev) = self.event.take() {
            ev.reset();
            self.pool.inner.free.lock().expect("pool mutex poisoned").push(ev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditrail_core::EventType;

    #[test]
    fn miss_then_hit_on_reuse() {
        let pool = EventPool::new();
        assert_eq!(pool.misses(), 0);
        let ev = pool.acquire();
        assert_eq!(pool.misses(), 1);
        drop(ev);
        let _ev2 = pool.acquire();
        assert_eq!(pool.hits(), 1);
        assert_eq!(pool.misses(), 1);
    }

    #[test]
    fn released_event_carries_no_residue() {
        let pool = EventPool::new();
        {
            let mut ev = pool.acquire();
            ev.method = "aws:ec2:launch".to_string();
            ev.params.insert("region".into(), "us-east-1".into());
            ev.event_type = EventType::ToolCall;
            ev.seq_index = 42;
        }
        let ev2 = pool.acquire();
        assert_eq!(ev2.method, "");
        assert!(ev2.params.is_empty());
        assert!(ev2.response.is_empty());
        assert_eq!(ev2.seq_index, 0);
        assert_eq!(ev2.task_id, None);
    }

    #[test]
    fn with_capacity_prefills_free_list() {
        let pool = EventPool::with_capacity(4);
        assert_eq!(pool.free_len(), 4);
        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.misses(), 0);
        assert_eq!(pool.hits(), 2);
    }
}
