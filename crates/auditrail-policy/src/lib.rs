pub mod engine;
pub mod matcher;
pub mod rules;

pub use engine::{MatchedRule, PolicyEngine};
pub use rules::{Condition, Defaults, Operator, PolicyFile, Rule};
