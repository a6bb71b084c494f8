use auditrail_core::{AuditrailError, Event, RiskLevel, Run, RunId};
use std::path::Path;

/// Append-only ledger store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   runs          — run_id bytes(16)          → bincode(Run)
///   meta          — utf8 key                  → raw bytes (e.g. "current_run")
///   run_tail      — run_id bytes(16)           → bincode((seq_index, current_hash))
///   events        — run_id(16) ++ seq_index(8, BE) → bincode(Event)
///   event_by_id   — event_id bytes(16)         → events-tree key (24 bytes)
///   task_index    — task_id utf8 bytes         → bincode(Vec<event_id bytes(16)>)
///   risk_index    — events-tree key (24 bytes) → () (membership set, high|critical only)
///
/// Writes are strictly serialized per run: the processor (`auditrail-pipeline`)
/// is the only writer in normal operation, but `store_event` independently
/// rejects out-of-order sequence writes (spec.md §4.5) using a
/// compare-and-swap on the composite primary key, so a retried write with the
/// same `(run_id, seq_index)` surfaces as a conflict rather than a silent
/// double-commit.
pub struct Store {
    db: sled::Db,
    runs: sled::Tree,
    meta: sled::Tree,
    run_tail: sled::Tree,
    events: sled::Tree,
    event_by_id: sled::Tree,
    task_index: sled::Tree,
    risk_index: sled::Tree,
}

const CURRENT_RUN_KEY: &[u8] = b"current_run";

fn event_key(run_id: &RunId, seq_index: u64) -> [u8; 24] {
    let mut k = [0u8; 24];
    k[..16].copy_from_slice(run_id.as_bytes());
    k[16..].copy_from_slice(&seq_index.to_be_bytes());
    k
}

/// Aggregate counts for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub event_count: u64,
    pub task_count: u64,
    pub high_risk_count: u64,
    pub critical_risk_count: u64,
}

/// Aggregate counts across the whole ledger.
#[derive(Debug, Clone, Default)]
pub struct GlobalStats {
    pub run_count: u64,
    pub event_count: u64,
    pub risk_event_count: u64,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuditrailError> {
        let db = sled::open(path)?;
        let runs = db.open_tree("runs")?;
        let meta = db.open_tree("meta")?;
        let run_tail = db.open_tree("run_tail")?;
        let events = db.open_tree("events")?;
        let event_by_id = db.open_tree("event_by_id")?;
        let task_index = db.open_tree("task_index")?;
        let risk_index = db.open_tree("risk_index")?;
        Ok(Self {
            db,
            runs,
            meta,
            run_tail,
            events,
            event_by_id,
            task_index,
            risk_index,
        })
    }

    // ── Runs ─────────────────────────────────────────────────────────────────

    pub fn insert_run(&self, run: &Run) -> Result<(), AuditrailError> {
        let bytes = bincode::serialize(run)?;
        self.runs.insert(run.run_id.as_bytes(), bytes)?;
        self.meta.insert(CURRENT_RUN_KEY, run.run_id.as_bytes().to_vec())?;
        Ok(())
    }

    pub fn has_runs(&self) -> Result<bool, AuditrailError> {
        Ok(!self.runs.is_empty())
    }

    pub fn current_run_id(&self) -> Result<Option<RunId>, AuditrailError> {
        match self.meta.get(CURRENT_RUN_KEY)? {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| AuditrailError::StorageError("corrupt current_run meta entry".into()))?;
                Ok(Some(RunId(uuid::Uuid::from_bytes(arr))))
            }
            None => Ok(None),
        }
    }

    pub fn run_info(&self, run_id: &RunId) -> Result<Option<Run>, AuditrailError> {
        match self.runs.get(run_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Last committed `(seq_index, current_hash)` for `run_id`, or `None` if
    /// the run has no events yet.
    pub fn last_event(&self, run_id: &RunId) -> Result<Option<(u64, String)>, AuditrailError> {
        match self.run_tail.get(run_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Append `event`. Rejects a sequence that does not immediately follow
    /// the run's current tail, and rejects a duplicate `(run_id, seq_index)`
    /// write via compare-and-swap on the primary key (spec.md §4.5).
    pub fn store_event(&self, event: &Event) -> Result<(), AuditrailError> {
        let expected = match self.last_event(&event.run_id)? {
            Some((last_seq, _)) => last_seq + 1,
            None => 0,
        };
        if event.seq_index != expected {
            return Err(AuditrailError::SequenceGap {
                expected,
                got: event.seq_index,
            });
        }

        let key = event_key(&event.run_id, event.seq_index);
        let bytes = bincode::serialize(event)?;

        let cas = self
            .events
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes.clone()))?;
        if cas.is_err() {
            return Err(AuditrailError::StorageError(format!(
                "duplicate commit at run_id={} seq_index={}",
                event.run_id, event.seq_index
            )));
        }

        self.event_by_id.insert(event.id.0.as_bytes(), key.to_vec())?;

        if let Some(task_id) = &event.task_id {
            let mut ids: Vec<[u8; 16]> = match self.task_index.get(task_id.as_bytes())? {
                Some(b) => bincode::deserialize(&b)?,
                None => Vec::new(),
            };
            ids.push(*event.id.0.as_bytes());
            self.task_index.insert(task_id.as_bytes(), bincode::serialize(&ids)?)?;
        }

        if event.risk_level.map(RiskLevel::is_notable).unwrap_or(false) {
            self.risk_index.insert(key.to_vec(), vec![])?;
        }

        self.run_tail
            .insert(event.run_id.as_bytes(), bincode::serialize(&(event.seq_index, event.current_hash.clone()))?)?;

        Ok(())
    }

    pub fn event_by_id(&self, id: &auditrail_core::EventId) -> Result<Option<Event>, AuditrailError> {
        match self.event_by_id.get(id.0.as_bytes())? {
            Some(key) => match self.events.get(&key)? {
                Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn events_by_run(&self, run_id: &RunId) -> Result<Vec<Event>, AuditrailError> {
        let mut out = Vec::new();
        for item in self.events.scan_prefix(run_id.as_bytes()) {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// The most recent `limit` events of `run_id`, newest first.
    pub fn recent_events(&self, run_id: &RunId, limit: usize) -> Result<Vec<Event>, AuditrailError> {
        let mut out = Vec::new();
        for item in self.events.scan_prefix(run_id.as_bytes()).rev() {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    pub fn events_by_task(&self, task_id: &str) -> Result<Vec<Event>, AuditrailError> {
        let ids: Vec<[u8; 16]> = match self.task_index.get(task_id.as_bytes())? {
            Some(b) => bincode::deserialize(&b)?,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(key) = self.event_by_id.get(id)? {
                if let Some(bytes) = self.events.get(&key)? {
                    out.push(bincode::deserialize(&bytes)?);
                }
            }
        }
        Ok(out)
    }

    /// Events with risk high|critical, newest first (spec.md §4.5).
    pub fn risk_events(&self) -> Result<Vec<Event>, AuditrailError> {
        let mut out = Vec::new();
        for item in self.risk_index.iter().rev() {
            let (key, _) = item?;
            if let Some(bytes) = self.events.get(&key)? {
                out.push(bincode::deserialize(&bytes)?);
            }
        }
        Ok(out)
    }

    pub fn unique_tasks(&self) -> Result<Vec<String>, AuditrailError> {
        let mut out = Vec::new();
        for item in self.task_index.iter() {
            let (key, _) = item?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    pub fn run_stats(&self, run_id: &RunId) -> Result<RunStats, AuditrailError> {
        let events = self.events_by_run(run_id)?;
        let mut stats = RunStats {
            event_count: events.len() as u64,
            ..Default::default()
        };
        let mut tasks = std::collections::HashSet::new();
        for e in &events {
            if let Some(t) = &e.task_id {
                tasks.insert(t.clone());
            }
            match e.risk_level {
                Some(RiskLevel::High) => stats.high_risk_count += 1,
                Some(RiskLevel::Critical) => stats.critical_risk_count += 1,
                _ => {}
            }
        }
        stats.task_count = tasks.len() as u64;
        Ok(stats)
    }

    pub fn global_stats(&self) -> Result<GlobalStats, AuditrailError> {
        Ok(GlobalStats {
            run_count: self.runs.len() as u64,
            event_count: self.events.len() as u64,
            risk_event_count: self.risk_index.len() as u64,
        })
    }

    pub fn flush(&self) -> Result<(), AuditrailError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn close(&self) -> Result<(), AuditrailError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditrail_core::{format_timestamp, Actor, EventId, EventType, GENESIS_HASH};
    use tempfile::tempdir;

    fn genesis_event(run_id: RunId) -> Event {
        Event {
            id: EventId::new(),
            run_id,
            seq_index: 0,
            timestamp: format_timestamp(chrono::Utc::now()),
            actor: Actor::System,
            event_type: EventType::Genesis,
            method: "genesis".into(),
            prev_hash: GENESIS_HASH.into(),
            current_hash: "a".repeat(64),
            signature: "b".repeat(128),
            ..Default::default()
        }
    }

    #[test]
    fn store_event_rejects_sequence_gap() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let run_id = RunId::new();
        let mut e = genesis_event(run_id);
        e.seq_index = 1; // should be 0
        let err = store.store_event(&e).unwrap_err();
        assert!(matches!(err, AuditrailError::SequenceGap { expected: 0, got: 1 }));
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let run_id = RunId::new();
        let e = genesis_event(run_id);
        store.store_event(&e).unwrap();

        let (seq, hash) = store.last_event(&run_id).unwrap().unwrap();
        assert_eq!(seq, 0);
        assert_eq!(hash, e.current_hash);

        let fetched = store.event_by_id(&e.id).unwrap().unwrap();
        assert_eq!(fetched.id, e.id);

        let all = store.events_by_run(&run_id).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn duplicate_commit_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let run_id = RunId::new();
        let e = genesis_event(run_id);
        store.store_event(&e).unwrap();
        let err = store.store_event(&e).unwrap_err();
        assert!(matches!(err, AuditrailError::StorageError(_) | AuditrailError::SequenceGap { .. }));
    }

    #[test]
    fn task_index_and_risk_index_populate() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let run_id = RunId::new();
        let mut e = genesis_event(run_id);
        e.task_id = Some("T1".into());
        e.risk_level = Some(RiskLevel::Critical);
        store.store_event(&e).unwrap();

        assert_eq!(store.unique_tasks().unwrap(), vec!["T1".to_string()]);
        assert_eq!(store.events_by_task("T1").unwrap().len(), 1);
        assert_eq!(store.risk_events().unwrap().len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let run_id = RunId::new();
        {
            let store = Store::open(dir.path()).unwrap();
            store.store_event(&genesis_event(run_id)).unwrap();
            store.flush().unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.last_event(&run_id).unwrap().unwrap().0, 0);
    }
}
