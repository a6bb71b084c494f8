use crate::anchor::fetch_anchor;
use crate::processor::Processor;
use crate::task_tracker::TaskTracker;
use auditrail_core::{
    format_timestamp, Actor, AuditrailError, BackpressureMode, Event, EventType, Run, RunId,
    ANCHOR_INTERVAL_SECS, BLOCK_MODE_MAX_WAIT_MS, BLOCK_MODE_WAIT_STEP_MS, DRAIN_BATCH_CAP,
    LOOP_ITERATION_CAP,
};
use auditrail_crypto::Signer;
use auditrail_metrics::Metrics;
use auditrail_policy::PolicyEngine;
use auditrail_pool::{EventPool, PooledEvent};
use auditrail_ring::BoundedRing;
use auditrail_store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// The worker (C7): owns the ring, the event pool, and the three background
/// loops (drain, anchor, policy-watcher) that process events and keep
/// ancillary state fresh (spec.md §4.7, §5).
pub struct Worker {
    ring: Arc<BoundedRing<PooledEvent>>,
    pool: EventPool,
    store: Arc<Store>,
    signer: Arc<Signer>,
    processor: Arc<Processor>,
    metrics: Arc<Metrics>,
    policy: Arc<PolicyEngine>,
    mode: BackpressureMode,
    anchor_url: Option<String>,
    run_id: Mutex<Option<RunId>>,
    closing: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    wake: Arc<Notify>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    /// Self-reference so the anchor loop can call back into `submit` without
    /// requiring an unstable `self: &Arc<Self>` receiver on `start`.
    self_ref: Weak<Worker>,
}

impl Worker {
    pub fn new(
        capacity: usize,
        store: Arc<Store>,
        signer: Arc<Signer>,
        mode: BackpressureMode,
        policy: Arc<PolicyEngine>,
        anchor_url: Option<String>,
    ) -> Result<Arc<Self>, AuditrailError> {
        let ring = Arc::new(BoundedRing::new(capacity)?);
        let pool = EventPool::with_capacity(capacity);
        let tasks = Arc::new(TaskTracker::new());
        let processor = Arc::new(Processor::new(store.clone(), signer.clone(), tasks));
        let metrics = Arc::new(Metrics::new(capacity as u64, matches!(mode, BackpressureMode::Block)));

        Ok(Arc::new_cyclic(|weak| Self {
            ring,
            pool,
            store,
            signer,
            processor,
            metrics,
            policy,
            mode,
            anchor_url,
            run_id: Mutex::new(None),
            closing: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
            loops: Mutex::new(Vec::new()),
            self_ref: weak.clone(),
        }))
    }

    /// Create the genesis event for a new run, or resume the ledger's current
    /// run, then spawn the three background loops (spec.md §4.7 point 1).
    pub fn start(&self, agent_name: &str) -> Result<(), AuditrailError> {
        let run_id = if self.store.has_runs()? {
            self.store
                .current_run_id()?
                .ok_or_else(|| AuditrailError::StorageError("ledger has runs but no current_run marker".into()))?
        } else {
            let run_id = RunId::new();
            let mut genesis = Event {
                run_id,
                event_type: EventType::Genesis,
                actor: Actor::System,
                method: "genesis".to_string(),
                timestamp: format_timestamp(chrono::Utc::now()),
                ..Default::default()
            };
            // Assign/hash/sign/store before recording the Run so genesis_hash
            // is known at insertion time (spec.md §3 invariant 1).
            self.processor.assign_and_store(&mut genesis)?;

            let run = Run {
                run_id,
                agent_name: agent_name.to_string(),
                started_at: genesis.timestamp.clone(),
                genesis_hash: genesis.current_hash.clone(),
                ledger_public_key: self.signer.public_key_hex(),
            };
            self.store.insert_run(&run)?;
            run_id
        };
        *self.run_id.lock().expect("run_id mutex poisoned") = Some(run_id);

        let mut loops = self.loops.lock().expect("loops mutex poisoned");
        loops.push(tokio::spawn(drain_loop(
            self.ring.clone(),
            self.processor.clone(),
            self.metrics.clone(),
            self.closing.clone(),
            self.healthy.clone(),
            self.wake.clone(),
        )));
        if let Some(url) = self.anchor_url.clone() {
            let worker = self.self_ref.upgrade().expect("worker outlives its own start() call");
            loops.push(tokio::spawn(anchor_loop(url, run_id, worker, self.closing.clone())));
        }
        loops.push(tokio::spawn(policy_watch_loop(self.policy.clone(), self.closing.clone())));

        Ok(())
    }

    /// Submit `event` for processing, honoring the configured backpressure
    /// mode (spec.md §4.7 points 2-3).
    pub async fn submit(&self, event: PooledEvent) -> Result<(), AuditrailError> {
        if self.closing.load(Ordering::Acquire) {
            tracing::warn!("submit rejected: worker is shutting down");
            return Err(AuditrailError::BufferFull);
        }

        match self.mode {
            BackpressureMode::Drop => match self.ring.push(event) {
                Ok(()) => {
                    self.metrics.queue_depth.store(self.ring.len() as u64, Ordering::Relaxed);
                    self.wake.notify_one();
                    Ok(())
                }
                Err(_dropped) => {
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("ring buffer full, dropping event");
                    Err(AuditrailError::BufferFull)
                }
            },
            BackpressureMode::Block => {
                let mut waited_ms: u64 = 0;
                let mut pending = event;
                loop {
                    match self.ring.push(pending) {
                        Ok(()) => {
                            self.metrics.queue_depth.store(self.ring.len() as u64, Ordering::Relaxed);
                            self.wake.notify_one();
                            return Ok(());
                        }
                        Err(back) => {
                            pending = back;
                            if self.closing.load(Ordering::Acquire) || waited_ms >= BLOCK_MODE_MAX_WAIT_MS {
                                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                                return Err(AuditrailError::BackpressureTimeout);
                            }
                            self.metrics.blocked_submits.fetch_add(1, Ordering::Relaxed);
                            tokio::time::sleep(Duration::from_millis(BLOCK_MODE_WAIT_STEP_MS)).await;
                            waited_ms += BLOCK_MODE_WAIT_STEP_MS;
                        }
                    }
                }
            }
        }
    }

    /// Idempotent graceful shutdown: stop accepting submissions, wake and
    /// join the background loops within `timeout_dur`, drain whatever
    /// remains in the ring directly, then flush storage (spec.md §4.7
    /// point 5, testable property 10).
    pub async fn shutdown(&self, timeout_dur: Duration) -> Result<(), AuditrailError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.wake.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.loops.lock().expect("loops mutex poisoned").drain(..).collect();
        for handle in handles {
            if timeout(timeout_dur, handle).await.is_err() {
                tracing::warn!("background loop did not stop within shutdown timeout");
            }
        }

        let mut drained = 0u64;
        while let Some(mut pooled) = self.ring.pop() {
            if let Err(e) = self.processor.process(&mut pooled) {
                tracing::error!(error = %e, "failed to drain event during shutdown");
            }
            drained += 1;
            if drained >= LOOP_ITERATION_CAP {
                tracing::warn!("shutdown drain hit the iteration safety cap");
                break;
            }
        }

        self.store.close()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn acquire_event(&self) -> PooledEvent {
        let pooled = self.pool.acquire();
        self.metrics.event_pool_hits.store(self.pool.hits(), Ordering::Relaxed);
        self.metrics.event_pool_misses.store(self.pool.misses(), Ordering::Relaxed);
        pooled
    }

    pub fn last_parent_for_task(&self, task_id: &str) -> Option<auditrail_core::EventId> {
        self.processor.tasks().last_event_id(task_id)
    }

    pub fn run_id(&self) -> Option<RunId> {
        *self.run_id.lock().expect("run_id mutex poisoned")
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }
}

async fn drain_loop(
    ring: Arc<BoundedRing<PooledEvent>>,
    processor: Arc<Processor>,
    metrics: Arc<Metrics>,
    closing: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let mut iterations: u64 = 0;
    loop {
        wake.notified().await;

        let mut drained_this_wake = 0usize;
        while drained_this_wake < DRAIN_BATCH_CAP {
            let Some(mut pooled) = ring.pop() else { break };
            let started = Instant::now();
            match processor.process(&mut pooled) {
                Ok(()) => {
                    metrics.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(error = %e, "event processing failed, marking worker unhealthy");
                    healthy.store(false, Ordering::Release);
                }
            }
            metrics.latency.record(started.elapsed());
            metrics.active_tasks.store(processor.tasks().active_count() as u64, Ordering::Relaxed);
            drained_this_wake += 1;
        }
        metrics.queue_depth.store(ring.len() as u64, Ordering::Relaxed);

        iterations += 1;
        if iterations >= LOOP_ITERATION_CAP {
            tracing::warn!("drain loop hit the iteration safety cap, resetting counter");
            iterations = 0;
        }

        if closing.load(Ordering::Acquire) && ring.is_empty() {
            break;
        }
    }
}

async fn anchor_loop(url: String, run_id: RunId, worker: Arc<Worker>, closing: Arc<AtomicBool>) {
    let client = reqwest::Client::new();
    let mut iterations: u64 = 0;
    loop {
        tokio::time::sleep(Duration::from_secs(ANCHOR_INTERVAL_SECS)).await;
        if closing.load(Ordering::Acquire) {
            break;
        }

        match fetch_anchor(&client, &url).await {
            Ok(reference) => {
                let mut params = serde_json::Map::new();
                params.insert("anchor_height".into(), serde_json::Value::from(reference.height));
                params.insert("anchor_hash".into(), serde_json::Value::String(reference.block_hash));
                let event = Event {
                    run_id,
                    event_type: EventType::Anchor,
                    actor: Actor::System,
                    method: "recorder:anchor".to_string(),
                    timestamp: format_timestamp(chrono::Utc::now()),
                    params,
                    ..Default::default()
                };
                let mut pooled = worker.acquire_event();
                *pooled = event;
                if let Err(e) = worker.submit(pooled).await {
                    tracing::warn!(error = %e, "failed to submit anchor event");
                }
            }
            Err(e) => tracing::warn!(error = %e, "anchor fetch failed, will retry next interval"),
        }

        iterations += 1;
        if iterations >= LOOP_ITERATION_CAP {
            tracing::warn!("anchor loop hit the iteration safety cap, resetting counter");
            iterations = 0;
        }
    }
}

async fn policy_watch_loop(policy: Arc<PolicyEngine>, closing: Arc<AtomicBool>) {
    let mut iterations: u64 = 0;
    loop {
        tokio::time::sleep(Duration::from_secs(auditrail_core::POLICY_POLL_INTERVAL_SECS)).await;
        if closing.load(Ordering::Acquire) {
            break;
        }
        if let Err(e) = policy.poll_reload() {
            tracing::warn!(error = %e, "policy reload failed, retaining prior rule set");
        }

        iterations += 1;
        if iterations >= LOOP_ITERATION_CAP {
            tracing::warn!("policy watch loop hit the iteration safety cap, resetting counter");
            iterations = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const POLICY_YAML: &str = r#"
version: 1
defaults:
  retention_days: 90
  signing_enabled: true
  log_level: info
policies: []
"#;

    fn make_worker(capacity: usize, mode: BackpressureMode) -> (Arc<Worker>, tempfile::TempDir, NamedTempFile) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("ledger")).unwrap());
        let signer = Arc::new(Signer::load_or_create(dir.path().join("key")).unwrap());
        let mut policy_file = NamedTempFile::new().unwrap();
        policy_file.write_all(POLICY_YAML.as_bytes()).unwrap();
        let policy = Arc::new(PolicyEngine::load(policy_file.path()).unwrap());
        let worker = Worker::new(capacity, store, signer, mode, policy, None).unwrap();
        (worker, dir, policy_file)
    }

    #[tokio::test]
    async fn start_creates_genesis_and_is_healthy() {
        let (worker, _dir, _policy_file) = make_worker(4, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        assert!(worker.run_id().is_some());
        assert!(worker.is_healthy());
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn submit_processes_event_through_drain_loop() {
        let (worker, _dir, _policy_file) = make_worker(4, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        let run_id = worker.run_id().unwrap();

        let mut pooled = worker.acquire_event();
        pooled.run_id = run_id;
        pooled.method = "mcp:list_tools".to_string();
        worker.submit(pooled).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
        // Genesis is stored synchronously in `start()`, outside the drain
        // loop, so only the submitted call is reflected here.
        assert_eq!(worker.metrics().processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn drop_mode_drops_when_ring_full() {
        let (worker, _dir, _policy_file) = make_worker(1, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        // Fill the 1-slot ring without letting the drain loop run.
        let ev1 = worker.acquire_event();
        let ring_direct = worker.ring.clone();
        ring_direct.push(ev1).ok();
        let ev2 = worker.acquire_event();
        let err = ring_direct.push(ev2);
        assert!(err.is_err());
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_event_updates_pool_metrics() {
        let (worker, _dir, _policy_file) = make_worker(4, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        let _ev = worker.acquire_event();
        assert!(worker.metrics().event_pool_hits.load(Ordering::Relaxed) > 0);
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn active_tasks_gauge_tracks_task_tracker() {
        let (worker, _dir, _policy_file) = make_worker(4, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        let run_id = worker.run_id().unwrap();

        let mut pooled = worker.acquire_event();
        pooled.run_id = run_id;
        pooled.method = "A".to_string();
        pooled.task_id = Some("T".to_string());
        worker.submit(pooled).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.metrics().active_tasks.load(Ordering::Relaxed), 1);
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (worker, _dir, _policy_file) = make_worker(4, BackpressureMode::Drop);
        worker.start("test-agent").unwrap();
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
