use crate::rpc::{extract_result_task_fields, extract_task_id, RpcRequest, RpcResponse};
use crate::state::AppState;
use auditrail_core::{Actor, EventType, TaskState, MAX_REQUEST_BODY_BYTES};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// Entry point for the interceptor's single POST route (spec.md §4.9).
///
/// Unparseable or non-JSON-RPC bodies are forwarded unchanged without
/// emitting an event (point 1); everything else is recorded before being
/// relayed upstream.
pub async fn handle(State(state): State<AppState>, body: Bytes) -> Response {
    if body.len() > MAX_REQUEST_BODY_BYTES {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            axum::Json(RpcResponse::error(Value::Null, -32000, "request body exceeds size limit")),
        )
            .into_response();
    }

    let parsed: Option<Value> = serde_json::from_slice(&body).ok();
    let Some(value) = parsed else {
        return forward_raw(&state, body).await;
    };

    if value.get("method").is_some() {
        match serde_json::from_value::<RpcRequest>(value.clone()) {
            Ok(req) => handle_request(&state, req).await,
            Err(_) => forward_raw(&state, body).await,
        }
    } else if value.get("result").is_some() {
        match serde_json::from_value::<RpcResponse>(value.clone()) {
            Ok(resp) => handle_response(&state, resp).await,
            Err(_) => forward_raw(&state, body).await,
        }
    } else {
        forward_raw(&state, body).await
    }
}

async fn handle_request(state: &AppState, mut req: RpcRequest) -> Response {
    if !state.worker.is_healthy() {
        return unhealthy_response(req.id.clone());
    }

    let matched = state.policy.evaluate(&req.method, &mut req.params);
    let task_id = extract_task_id(&req.params);
    let parent_id = task_id.as_deref().and_then(|t| state.worker.last_parent_for_task(t));

    let mut event = state.worker.acquire_event();
    event.run_id = state.worker.run_id().unwrap_or_default();
    event.timestamp = auditrail_core::format_timestamp(chrono::Utc::now());
    event.actor = Actor::Agent;
    event.event_type = EventType::ToolCall;
    event.method = req.method.clone();
    event.params = req.params.clone();
    event.task_id = task_id;
    event.parent_id = parent_id;
    if let Some(m) = matched {
        event.policy_id = Some(m.policy_id);
        event.risk_level = Some(m.risk_level);
    }

    if let Err(e) = state.worker.submit(event).await {
        tracing::warn!(error = %e, "failed to submit tool_call event");
    }

    forward_json(state, &req).await
}

async fn handle_response(state: &AppState, resp: RpcResponse) -> Response {
    if !state.worker.is_healthy() {
        return unhealthy_response(resp.id.clone());
    }

    if let Some(result) = &resp.result {
        let (task_id, state_str) = extract_result_task_fields(result);
        let parent_id = task_id.as_deref().and_then(|t| state.worker.last_parent_for_task(t));

        let mut event = state.worker.acquire_event();
        event.run_id = state.worker.run_id().unwrap_or_default();
        event.timestamp = auditrail_core::format_timestamp(chrono::Utc::now());
        event.actor = Actor::Agent;
        event.event_type = EventType::ToolResponse;
        event.method = "tool_response".to_string();
        event.response = result.as_object().cloned().unwrap_or_default();
        event.task_id = task_id;
        event.task_state = state_str.as_deref().and_then(TaskState::parse);
        event.parent_id = parent_id;

        if let Err(e) = state.worker.submit(event).await {
            tracing::warn!(error = %e, "failed to submit tool_response event");
        }
    }

    forward_json(state, &resp).await
}

fn unhealthy_response(id: Value) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        axum::Json(RpcResponse::error(id, -32001, "recorder unhealthy, request rejected")),
    )
        .into_response()
}

async fn forward_json<T: serde::Serialize>(state: &AppState, payload: &T) -> Response {
    match state.http.post(&state.upstream_url).json(payload).send().await {
        Ok(upstream) => relay_upstream(upstream).await,
        Err(e) => {
            tracing::error!(error = %e, "failed to reach upstream");
            (StatusCode::BAD_GATEWAY, axum::Json(RpcResponse::error(Value::Null, -32002, "upstream unreachable")))
                .into_response()
        }
    }
}

async fn forward_raw(state: &AppState, body: Bytes) -> Response {
    match state.http.post(&state.upstream_url).body(body).send().await {
        Ok(upstream) => relay_upstream(upstream).await,
        Err(e) => {
            tracing::error!(error = %e, "failed to reach upstream");
            (StatusCode::BAD_GATEWAY, axum::Json(RpcResponse::error(Value::Null, -32002, "upstream unreachable")))
                .into_response()
        }
    }
}

async fn relay_upstream(upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    match upstream.bytes().await {
        Ok(bytes) => (status, bytes).into_response(),
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}
