use auditrail_pipeline::Worker;
use auditrail_policy::PolicyEngine;
use std::sync::Arc;

/// Shared state for the interceptor's HTTP handlers (spec.md §4.9).
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
    pub policy: Arc<PolicyEngine>,
    pub upstream_url: String,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(worker: Arc<Worker>, policy: Arc<PolicyEngine>, upstream_url: String) -> Self {
        Self {
            worker,
            policy,
            upstream_url,
            http: reqwest::Client::new(),
        }
    }
}
