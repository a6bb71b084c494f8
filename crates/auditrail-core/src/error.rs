use thiserror::Error;

/// Unified error taxonomy for the auditrail core (spec.md §7).
///
/// Background loops never propagate these to callers — they log and update
/// worker health instead (see `auditrail-pipeline`). Synchronous callers
/// (the interceptor, the auditor CLI surface) receive these directly.
#[derive(Debug, Error)]
pub enum AuditrailError {
    // ── Caller errors ────────────────────────────────────────────────────────
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Key lifecycle ────────────────────────────────────────────────────────
    #[error("signing key I/O failure: {0}")]
    KeyIoError(String),

    // ── Processor / storage ──────────────────────────────────────────────────
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("storage error: {0}")]
    StorageError(String),

    // ── Verification ─────────────────────────────────────────────────────────
    #[error("hash mismatch at seq_index {seq_index}")]
    HashMismatch { seq_index: u64 },

    #[error("chain tampered at seq_index {seq_index}: prev_hash linkage broken")]
    ChainTampered { seq_index: u64 },

    #[error("invalid signature at seq_index {seq_index}")]
    InvalidSignature { seq_index: u64 },

    // ── Backpressure ──────────────────────────────────────────────────────────
    #[error("ring buffer full")]
    BufferFull,

    #[error("backpressure timeout exceeded in block mode")]
    BackpressureTimeout,

    // ── External collaborators ───────────────────────────────────────────────
    #[error("anchor fetch failed: {0}")]
    AnchorFetchError(String),

    #[error("policy parse error: {0}")]
    PolicyParseError(String),
}

impl From<sled::Error> for AuditrailError {
    fn from(e: sled::Error) -> Self {
        AuditrailError::StorageError(e.to_string())
    }
}

impl From<bincode::Error> for AuditrailError {
    fn from(e: bincode::Error) -> Self {
        AuditrailError::StorageError(e.to_string())
    }
}

impl From<serde_yaml::Error> for AuditrailError {
    fn from(e: serde_yaml::Error) -> Self {
        AuditrailError::PolicyParseError(e.to_string())
    }
}

impl From<std::io::Error> for AuditrailError {
    fn from(e: std::io::Error) -> Self {
        AuditrailError::KeyIoError(e.to_string())
    }
}
