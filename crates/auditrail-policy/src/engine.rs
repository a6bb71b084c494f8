use crate::matcher::find_matching_rule;
use crate::rules::PolicyFile;
use auditrail_core::{AuditrailError, RiskLevel, REDACTED_PLACEHOLDER};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Outcome of consulting the policy engine for a method/params pair.
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub policy_id: String,
    pub risk_level: RiskLevel,
    pub redact: Vec<String>,
}

/// Hot-reloadable rule set (spec.md §4.8). Readers (`evaluate`) are frequent;
/// writers (`poll_reload`) are rare — a read-write lock over the parsed rule
/// set lets concurrent evaluators observe a single consistent snapshot
/// (spec.md §5).
pub struct PolicyEngine {
    path: PathBuf,
    active: RwLock<PolicyFile>,
    last_mtime_secs: AtomicU64,
}

impl PolicyEngine {
    /// Parse the policy file at `path`. Fails with `PolicyParseError` —
    /// fatal at startup per spec.md §7.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditrailError> {
        let path = path.as_ref().to_path_buf();
        let file = parse_file(&path)?;
        let mtime = mtime_secs(&path).unwrap_or(0);
        Ok(Self {
            path,
            active: RwLock::new(file),
            last_mtime_secs: AtomicU64::new(mtime),
        })
    }

    /// Poll the file's mtime; if it changed since the last check, re-parse
    /// and atomically swap the active rule set. On a reload parse failure
    /// the prior rule set is retained (spec.md §7: "retain prior rule set
    /// on reload") and the error is returned for the caller to log.
    pub fn poll_reload(&self) -> Result<bool, AuditrailError> {
        let current_mtime = match mtime_secs(&self.path) {
            Some(m) => m,
            None => return Ok(false),
        };
        let last = self.last_mtime_secs.load(Ordering::Acquire);
        if current_mtime == last {
            return Ok(false);
        }
        match parse_file(&self.path) {
            Ok(file) => {
                *self.active.write() = file;
                self.last_mtime_secs.store(current_mtime, Ordering::Release);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Consult the active rule set for `method`/`params`. Applies any
    /// matched redaction in place and returns the match, if any (spec.md
    /// §4.9 points 4-5).
    pub fn evaluate(&self, method: &str, params: &mut Map<String, Value>) -> Option<MatchedRule> {
        let active = self.active.read();
        let rule = find_matching_rule(&active.policies, method, params)?;
        for key in &rule.redact {
            if params.contains_key(key) {
                params.insert(key.clone(), Value::String(REDACTED_PLACEHOLDER.to_string()));
            }
        }
        Some(MatchedRule {
            policy_id: rule.id.clone(),
            risk_level: rule.risk_level,
            redact: rule.redact.clone(),
        })
    }

    pub fn defaults_log_level(&self) -> String {
        self.active.read().defaults.log_level.clone()
    }
}

fn parse_file(path: &Path) -> Result<PolicyFile, AuditrailError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AuditrailError::PolicyParseError(format!("reading policy file: {e}")))?;
    let file: PolicyFile = serde_yaml::from_str(&contents)?;
    Ok(file)
}

fn mtime_secs(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified.duration_since(SystemTime::UNIX_EPOCH).ok().map(|d| d.as_secs())
}
