//! ─── Auditrail Constants ────────────────────────────────────────────────────

// ── Hash chain ───────────────────────────────────────────────────────────────

/// The sentinel `prev_hash` of the genesis event: 64 ASCII zero characters
/// (spec.md §3 invariant 3).
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const _: () = assert!(GENESIS_HASH.len() == 64);

// ── Wire protocol (C9) ───────────────────────────────────────────────────────

/// Maximum accepted request body size before rejection (spec.md §4.9 point 2).
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Maximum `task_id` length accepted from the wire (spec.md §4.9 point 3).
pub const MAX_TASK_ID_LEN: usize = 64;

// ── Worker (C7) ──────────────────────────────────────────────────────────────

/// Anchor loop period (spec.md §4.7).
pub const ANCHOR_INTERVAL_SECS: u64 = 600;

/// HTTP timeout for the anchor fetch (spec.md §5).
pub const ANCHOR_FETCH_TIMEOUT_SECS: u64 = 5;

/// Block-mode submission poll interval (spec.md §4.7 "spin-wait ... 1 ms intervals").
pub const BLOCK_MODE_WAIT_STEP_MS: u64 = 1;

/// Cumulative block-mode wait budget before a submit gives up and drops
/// (spec.md §5: "bounded retry count (~1 second cumulative)").
pub const BLOCK_MODE_MAX_WAIT_MS: u64 = 1000;

/// Maximum events popped from the ring per drain-loop wake.
pub const DRAIN_BATCH_CAP: usize = 256;

/// Safety-net iteration cap for loops that are logically unbounded, per
/// spec.md §9's "open question: unbounded background loops" — large finite
/// cap instead of a truly unbounded loop, with an operator-visible warning
/// on exceedance.
pub const LOOP_ITERATION_CAP: u64 = 1 << 30;

/// Upper bounds (ms) of the fixed latency histogram buckets (spec.md §4.11);
/// an implicit `+Inf` bucket catches everything above the last value.
pub const LATENCY_BUCKETS_MS: [u64; 6] = [1, 5, 10, 25, 50, 100];

// ── Policy engine (C8) ───────────────────────────────────────────────────────

/// Policy file mtime poll interval (spec.md §4.8, §6).
pub const POLICY_POLL_INTERVAL_SECS: u64 = 5;

/// Literal redaction replacement value (spec.md §4.9 point 4).
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

// ── Logging ──────────────────────────────────────────────────────────────────

/// Environment variable naming the minimum log level (spec.md §6).
pub const LOG_LEVEL_ENV_VAR: &str = "AUDITRAIL_LOG_LEVEL";

/// Environment variable naming the admin-surface bearer token (spec.md §6).
pub const ADMIN_TOKEN_ENV_VAR: &str = "AUDITRAIL_ADMIN_TOKEN";

pub const DEFAULT_LOG_LEVEL: &str = "info";
