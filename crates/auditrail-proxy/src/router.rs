use crate::handler::handle;
use crate::state::AppState;
use axum::routing::post;
use axum::Router;

/// Build the interceptor's router: a single POST route accepting the
/// JSON-RPC-shaped wire protocol (spec.md §4.9, §6).
///
/// The oversized-body rejection happens in `handle` itself rather than as a
/// `tower_http::limit::RequestBodyLimitLayer` here — spec.md §4.9 point 2
/// requires a JSON-RPC-shaped error response, and a layer-level rejection
/// would short-circuit before `handle` ever runs, returning a generic HTTP
/// error instead.
pub fn build_router(state: AppState) -> Router {
    Router::new().route("/", post(handle)).with_state(state)
}
