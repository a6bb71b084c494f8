use crate::task_tracker::TaskTracker;
use auditrail_core::{Actor, AuditrailError, Event, EventId, EventType, RunId};
use auditrail_crypto::{chain_hash, Signer};
use auditrail_store::Store;
use std::sync::Arc;

/// Event processor (C6). Given a filled event, assigns sequence/hash/
/// signature and persists it, then tracks per-task state transitions
/// (spec.md §4.6).
pub struct Processor {
    store: Arc<Store>,
    signer: Arc<Signer>,
    tasks: Arc<TaskTracker>,
}

impl Processor {
    pub fn new(store: Arc<Store>, signer: Arc<Signer>, tasks: Arc<TaskTracker>) -> Self {
        Self { store, signer, tasks }
    }

    /// Process `event` atomically from the caller's perspective (spec.md
    /// §4.6 steps 1-5). Any failure here marks the worker unhealthy — the
    /// caller (the drain loop) is responsible for that transition.
    pub fn process(&self, event: &mut Event) -> Result<(), AuditrailError> {
        self.assign_and_store(event)?;

        // Step 6: per-task state tracking. Every event carrying a task_id
        // updates the last-event-id pointer (tool_call requests never carry
        // task_state — only tool_response does — so this must not be gated
        // on task_state being present). Failures here are logged by the
        // caller but never propagated as a processing failure.
        if let Some(task_id) = event.task_id.clone() {
            self.tasks.record(task_id.clone(), event.id);
            if let Some(state) = event.task_state {
                if state.is_terminal() {
                    if let Err(e) = self.emit_task_terminal(&task_id, event.run_id) {
                        tracing::warn!(error = %e, task_id = %task_id, "failed to emit task_terminal event");
                    }
                    self.tasks.purge(&task_id);
                }
            }
        }

        Ok(())
    }

    /// Assign `seq_index`/`prev_hash` from the store's current tail,
    /// compute `current_hash`, sign it, and persist (spec.md §4.6 steps 1-5).
    pub fn assign_and_store(&self, event: &mut Event) -> Result<(), AuditrailError> {
        let (seq_index, prev_hash) = match self.store.last_event(&event.run_id)? {
            Some((last_seq, last_hash)) => (last_seq + 1, last_hash),
            None => (0, auditrail_core::GENESIS_HASH.to_string()),
        };
        event.seq_index = seq_index;
        event.prev_hash = prev_hash;

        let payload = event.canonical_payload();
        event.current_hash = chain_hash(&event.prev_hash, &payload)?;
        event.signature = self.signer.sign(&event.current_hash);

        self.store.store_event(event)?;
        Ok(())
    }

    fn emit_task_terminal(&self, task_id: &str, run_id: RunId) -> Result<(), AuditrailError> {
        let parent_id: Option<EventId> = self.tasks.last_event_id(task_id);
        let mut terminal = Event {
            run_id,
            actor: Actor::System,
            event_type: EventType::TaskTerminal,
            method: "recorder:task_terminal".to_string(),
            task_id: Some(task_id.to_string()),
            parent_id,
            ..Default::default()
        };
        self.assign_and_store(&mut terminal)
    }

    pub fn tasks(&self) -> &Arc<TaskTracker> {
        &self.tasks
    }
}
