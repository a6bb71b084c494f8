use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::constants::GENESIS_HASH;

// ── RunId ────────────────────────────────────────────────────────────────────

/// Opaque, time-ordered unique identifier for a run (UUIDv7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

// ── EventId ──────────────────────────────────────────────────────────────────

/// Opaque unique identifier for an event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

// ── Actor / EventType / TaskState / RiskLevel / BackpressureMode ────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Agent,
    User,
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Genesis,
    ToolCall,
    ToolResponse,
    Blocked,
    Anchor,
    TaskTerminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states purge the task from the active-tasks map and emit a
    /// synthetic `task_terminal` event (spec.md §4.6 point 6, glossary).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "working" => Some(TaskState::Working),
            "input_required" => Some(TaskState::InputRequired),
            "completed" => Some(TaskState::Completed),
            "failed" => Some(TaskState::Failed),
            "cancelled" => Some(TaskState::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Used by `risk_events()` (spec.md §4.5): events with risk high|critical.
    pub fn is_notable(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    Drop,
    Block,
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// A single execution session of the recorder (spec.md §3). Never mutated
/// after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub agent_name: String,
    pub started_at: String,
    pub genesis_hash: String,
    pub ledger_public_key: String,
}

// ── Event ────────────────────────────────────────────────────────────────────

/// The atomic ledger record (spec.md §3). `params`/`response` retain their
/// map allocation across pool `reset()` calls so the pool avoids per-call
/// allocation (spec.md §4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub run_id: RunId,
    pub seq_index: u64,
    pub timestamp: String,
    pub actor: Actor,
    pub event_type: EventType,
    pub method: String,
    pub params: Map<String, Value>,
    pub response: Map<String, Value>,
    pub task_id: Option<String>,
    pub task_state: Option<TaskState>,
    pub parent_id: Option<EventId>,
    pub policy_id: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub prev_hash: String,
    pub current_hash: String,
    pub signature: String,
    pub was_blocked: bool,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: EventId::default(),
            run_id: RunId::default(),
            seq_index: 0,
            timestamp: String::new(),
            actor: Actor::Agent,
            event_type: EventType::ToolCall,
            method: String::new(),
            params: Map::new(),
            response: Map::new(),
            task_id: None,
            task_state: None,
            parent_id: None,
            policy_id: None,
            risk_level: None,
            prev_hash: String::new(),
            current_hash: String::new(),
            signature: String::new(),
            was_blocked: false,
        }
    }
}

impl Event {
    /// Clear every field back to its zero value in place, retaining the
    /// `params`/`response` map allocations (testable property 8: "pool
    /// reset"). Called by `auditrail-pool` on release, never by callers
    /// holding a leased event.
    pub fn reset(&mut self) {
        self.id = EventId::default();
        self.run_id = RunId::default();
        self.seq_index = 0;
        self.timestamp.clear();
        self.actor = Actor::Agent;
        self.event_type = EventType::ToolCall;
        self.method.clear();
        self.params.clear();
        self.response.clear();
        self.task_id = None;
        self.task_state = None;
        self.parent_id = None;
        self.policy_id = None;
        self.risk_level = None;
        self.prev_hash.clear();
        self.current_hash.clear();
        self.signature.clear();
        self.was_blocked = false;
    }

    /// The canonical payload per spec.md §4.1: an ordered mapping over
    /// exactly these keys. Key order here is cosmetic — the canonicalization
    /// scheme sorts them — but the set must match exactly.
    pub fn canonical_payload(&self) -> Value {
        let mut m = Map::new();
        m.insert("id".into(), Value::String(self.id.to_string()));
        m.insert("run_id".into(), Value::String(self.run_id.to_string()));
        m.insert("seq_index".into(), Value::from(self.seq_index));
        m.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        m.insert("actor".into(), serde_json::to_value(self.actor).unwrap());
        m.insert("event_type".into(), serde_json::to_value(self.event_type).unwrap());
        m.insert("method".into(), Value::String(self.method.clone()));
        m.insert("params".into(), Value::Object(self.params.clone()));
        m.insert("response".into(), Value::Object(self.response.clone()));
        m.insert(
            "task_id".into(),
            self.task_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        m.insert(
            "task_state".into(),
            self.task_state
                .map(|s| serde_json::to_value(s).unwrap())
                .unwrap_or(Value::Null),
        );
        m.insert(
            "parent_id".into(),
            self.parent_id
                .map(|p| Value::String(p.to_string()))
                .unwrap_or(Value::Null),
        );
        m.insert(
            "policy_id".into(),
            self.policy_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        m.insert(
            "risk_level".into(),
            self.risk_level
                .map(|r| serde_json::to_value(r).unwrap())
                .unwrap_or(Value::Null),
        );
        Value::Object(m)
    }

    pub fn is_genesis(&self) -> bool {
        self.seq_index == 0 && matches!(self.event_type, EventType::Genesis) && self.prev_hash == GENESIS_HASH
    }
}

/// RFC3339 timestamp with nanosecond precision, the deterministic formatter
/// required by spec.md §4.1 ("the formatter choice is part of the contract").
pub fn format_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
