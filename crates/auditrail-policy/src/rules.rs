use auditrail_core::RiskLevel;
use serde::Deserialize;

/// The declarative rule set file (spec.md §4.8, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyFile {
    pub version: u32,
    pub defaults: Defaults,
    #[serde(default)]
    pub policies: Vec<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    pub retention_days: i64,
    pub signing_enabled: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub id: String,
    pub match_methods: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub redact: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub key: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Any operator string not in the set above. Per spec.md §4.8: "an
    /// unknown operator is skipped (neither passes nor fails)".
    #[serde(other)]
    Unknown,
}
