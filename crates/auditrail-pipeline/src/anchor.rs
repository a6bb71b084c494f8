use auditrail_core::{AuditrailError, ANCHOR_FETCH_TIMEOUT_SECS};
use serde::Deserialize;
use std::time::Duration;

/// Reference returned by the external anchor service: a block height and the
/// hash it committed to at that height (spec.md §4.7, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct AnchorReference {
    pub height: u64,
    pub block_hash: String,
}

/// Fetch the current anchor reference from `url`. The anchor service is an
/// external collaborator (spec.md §1) — this is a plain scheduled HTTP GET,
/// bounded by `ANCHOR_FETCH_TIMEOUT_SECS` (spec.md §5). Failures never retry
/// automatically (spec.md Non-goals); the caller logs and tries again on the
/// next tick.
pub async fn fetch_anchor(client: &reqwest::Client, url: &str) -> Result<AnchorReference, AuditrailError> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(ANCHOR_FETCH_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| AuditrailError::AnchorFetchError(e.to_string()))?;

    let resp = resp
        .error_for_status()
        .map_err(|e| AuditrailError::AnchorFetchError(e.to_string()))?;

    resp.json::<AnchorReference>()
        .await
        .map_err(|e| AuditrailError::AnchorFetchError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_url_yields_anchor_fetch_error() {
        let client = reqwest::Client::new();
        let err = fetch_anchor(&client, "http://127.0.0.1:1/anchor").await.unwrap_err();
        assert!(matches!(err, AuditrailError::AnchorFetchError(_)));
    }
}
