use crate::rules::{Condition, Operator, Rule};
use serde_json::{Map, Value};

/// `match(pattern, method)` (spec.md §4.8): exact equality, or prefix
/// equality when `pattern` ends with `*`. Empty pattern or method is a
/// non-match.
pub fn match_pattern(pattern: &str, method: &str) -> bool {
    if pattern.is_empty() || method.is_empty() {
        return false;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => method.starts_with(prefix),
        None => pattern == method,
    }
}

/// `eval(conditions, params)` (spec.md §4.8): every condition must hold.
/// A missing key fails its condition; an unknown operator is skipped.
pub fn eval(conditions: &[Condition], params: &Map<String, Value>) -> bool {
    conditions.iter().all(|c| eval_one(c, params))
}

fn eval_one(c: &Condition, params: &Map<String, Value>) -> bool {
    let actual = match params.get(&c.key) {
        Some(v) => v,
        None => return false,
    };

    match c.operator {
        Operator::Unknown => true,
        Operator::Eq => match (coerce_number(actual), coerce_number(&c.value)) {
            (Some(a), Some(b)) => a == b,
            _ => stringify(actual) == stringify(&c.value),
        },
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
            match (coerce_number(actual), coerce_number(&c.value)) {
                (Some(a), Some(b)) => match c.operator {
                    Operator::Gt => a > b,
                    Operator::Lt => a < b,
                    Operator::Gte => a >= b,
                    Operator::Lte => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

/// Coerces numbers, numeric strings, and booleans to an `f64` for numeric
/// comparisons (spec.md §4.8).
fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Stringified form used for non-numeric equality comparisons.
fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The first rule (in declaration order) whose method pattern matches and
/// whose conditions all evaluate true (spec.md §4.8). No match is a valid
/// outcome, classifying the event as low risk.
pub fn find_matching_rule<'a>(rules: &'a [Rule], method: &str, params: &Map<String, Value>) -> Option<&'a Rule> {
    rules
        .iter()
        .find(|rule| rule.match_methods.iter().any(|p| match_pattern(p, method)) && eval(&rule.conditions, params))
}
