use auditrail_core::EventId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Single-owner mapping of in-flight tasks to their most recent event
/// (spec.md §9: "treat the active-task state as a single owner per task id").
/// Only the event processor (C6) writes to this map, funneled through the
/// single drain loop; the interceptor (C9) only reads it, to populate
/// `parent_id` on the next event for a task.
pub struct TaskTracker {
    active: Mutex<HashMap<String, EventId>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn last_event_id(&self, task_id: &str) -> Option<EventId> {
        self.active.lock().expect("task tracker mutex poisoned").get(task_id).copied()
    }

    pub fn record(&self, task_id: String, event_id: EventId) {
        self.active.lock().expect("task tracker mutex poisoned").insert(task_id, event_id);
    }

    pub fn purge(&self, task_id: &str) {
        self.active.lock().expect("task tracker mutex poisoned").remove(task_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("task tracker mutex poisoned").len()
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_purges() {
        let t = TaskTracker::new();
        let id = EventId::new();
        t.record("T1".into(), id);
        assert_eq!(t.last_event_id("T1"), Some(id));
        assert_eq!(t.active_count(), 1);
        t.purge("T1");
        assert_eq!(t.last_event_id("T1"), None);
        assert_eq!(t.active_count(), 0);
    }
}
