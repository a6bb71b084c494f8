//! auditrail-node — the auditrail recorder process.
//!
//! Startup sequence:
//!   1. Open (or initialise) the ledger store and the signing key
//!   2. Load the policy file
//!   3. Start the worker (emits genesis if the ledger is fresh, launches the
//!      drain/anchor/policy-watcher loops)
//!   4. Start the JSON-RPC interceptor HTTP server
//!   5. Wait for a shutdown signal and drain the worker

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use auditrail_core::{BackpressureMode, LOG_LEVEL_ENV_VAR};
use auditrail_crypto::Signer;
use auditrail_pipeline::Worker;
use auditrail_policy::PolicyEngine;
use auditrail_proxy::{build_router, AppState};
use auditrail_store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "auditrail-node",
    version,
    about = "Transparent recording proxy between an autonomous agent and its tool endpoints"
)]
struct Args {
    /// Directory for the append-only ledger store.
    #[arg(long, default_value = "~/.auditrail/ledger")]
    ledger_dir: PathBuf,

    /// Path to the signer's private key file (created on first run).
    #[arg(long, default_value = "~/.auditrail/signing.key")]
    key_path: PathBuf,

    /// Path to the policy YAML file.
    #[arg(long, default_value = "~/.auditrail/policy.yaml")]
    policy_path: PathBuf,

    /// Interceptor HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen_addr: SocketAddr,

    /// Upstream tool-endpoint base URL that unblocked requests are forwarded to.
    #[arg(long)]
    upstream_url: String,

    /// External blockchain anchor source URL. When omitted, the anchor loop
    /// does not run.
    #[arg(long)]
    anchor_url: Option<String>,

    /// Label recorded on the run's genesis event.
    #[arg(long, default_value = "default-agent")]
    agent_name: String,

    /// Bounded ring capacity (spec.md §4.3).
    #[arg(long, default_value_t = 4096)]
    ring_capacity: usize,

    /// Backpressure mode when the ring is full.
    #[arg(long, value_enum, default_value = "drop")]
    backpressure: BackpressureArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum BackpressureArg {
    Drop,
    Block,
}

impl From<BackpressureArg> for BackpressureMode {
    fn from(value: BackpressureArg) -> Self {
        match value {
            BackpressureArg::Drop => BackpressureMode::Drop,
            BackpressureArg::Block => BackpressureMode::Block,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_LEVEL_ENV_VAR)
                .unwrap_or_else(|_| "info,auditrail=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("auditrail node starting");

    // ── Ledger store + signer ────────────────────────────────────────────────
    let ledger_dir = expand_tilde(&args.ledger_dir);
    let key_path = expand_tilde(&args.key_path);
    std::fs::create_dir_all(&ledger_dir)
        .with_context(|| format!("creating ledger dir {}", ledger_dir.display()))?;
    if let Some(parent) = key_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating key dir {}", parent.display()))?;
    }

    let store = Arc::new(Store::open(&ledger_dir).context("opening ledger store")?);
    let signer = Arc::new(Signer::load_or_create(&key_path).context("loading signing key")?);

    // ── Policy engine ─────────────────────────────────────────────────────────
    let policy_path = expand_tilde(&args.policy_path);
    let policy = Arc::new(PolicyEngine::load(&policy_path).context("loading policy file")?);

    // ── Worker ────────────────────────────────────────────────────────────────
    let worker = Worker::new(
        args.ring_capacity,
        store,
        signer,
        args.backpressure.into(),
        policy.clone(),
        args.anchor_url,
    )
    .context("constructing worker")?;
    worker.start(&args.agent_name).context("starting worker")?;
    info!(run_id = ?worker.run_id(), "ledger run ready");

    // ── HTTP interceptor ──────────────────────────────────────────────────────
    let state = AppState::new(worker.clone(), policy, args.upstream_url.clone());
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.listen_addr)
        .await
        .with_context(|| format!("binding {}", args.listen_addr))?;
    info!(addr = %args.listen_addr, upstream = %args.upstream_url, "interceptor listening");

    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!(error = %e, "interceptor server task panicked");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    worker
        .shutdown(Duration::from_secs(10))
        .await
        .context("shutting down worker")?;
    info!("auditrail node stopped");
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
