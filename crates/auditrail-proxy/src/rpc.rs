use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON-RPC 2.0 request as seen on the wire (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// A JSON-RPC 2.0 response as seen on the wire (spec.md §6). Exactly one of
/// `result`/`error` is present on any real response; both are optional here
/// only to allow a single struct to deserialize either shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// `result.task_id` / `result.state`, the response-side causal-tracking
/// extension (spec.md §6).
pub fn extract_result_task_fields(result: &Value) -> (Option<String>, Option<String>) {
    let task_id = result.get("task_id").and_then(Value::as_str).map(str::to_string);
    let state = result.get("state").and_then(Value::as_str).map(str::to_string);
    (task_id, state)
}

/// `params.task_id`, capped at `MAX_TASK_ID_LEN` chars (spec.md §4.9 point 3).
pub fn extract_task_id(params: &Map<String, Value>) -> Option<String> {
    let raw = params.get("task_id")?.as_str()?;
    let capped: String = raw.chars().take(auditrail_core::MAX_TASK_ID_LEN).collect();
    Some(capped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_capped() {
        let mut params = Map::new();
        let long = "x".repeat(100);
        params.insert("task_id".into(), Value::String(long));
        let extracted = extract_task_id(&params).unwrap();
        assert_eq!(extracted.len(), auditrail_core::MAX_TASK_ID_LEN);
    }

    #[test]
    fn request_round_trips() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"mcp:list_tools","params":{}}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, "mcp:list_tools");
    }

    #[test]
    fn response_result_state_extracted() {
        let result = serde_json::json!({"task_id": "T1", "state": "completed"});
        let (task_id, state) = extract_result_task_fields(&result);
        assert_eq!(task_id.as_deref(), Some("T1"));
        assert_eq!(state.as_deref(), Some("completed"));
    }
}
