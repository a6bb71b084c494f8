use auditrail_core::AuditrailError;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes `SHA-256(prev_hash || CanonicalJSON(payload))` (spec.md §4.1).
///
/// Canonicalization uses RFC 8785 JSON Canonicalization Scheme (JCS):
/// lexicographically sorted object keys, minimal whitespace, UTF-8. This is
/// the implementation's chosen scheme per spec.md §9's "JSON canonicalization
/// dependency" design note — changing it would silently invalidate every
/// historical verification.
pub fn chain_hash(prev_hash: &str, payload: &Value) -> Result<String, AuditrailError> {
    if prev_hash.is_empty() {
        return Err(AuditrailError::InvalidInput("prev_hash must not be empty".into()));
    }
    if payload.is_null() {
        return Err(AuditrailError::InvalidInput("payload must not be absent".into()));
    }

    let canonical = serde_jcs::to_string(payload)
        .map_err(|e| AuditrailError::InvalidInput(format!("payload not canonicalizable: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditrail_core::GENESIS_HASH;
    use serde_json::json;

    #[test]
    fn rejects_empty_prev_hash() {
        let err = chain_hash("", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, AuditrailError::InvalidInput(_)));
    }

    #[test]
    fn rejects_absent_payload() {
        let err = chain_hash(GENESIS_HASH, &Value::Null).unwrap_err();
        assert!(matches!(err, AuditrailError::InvalidInput(_)));
    }

    #[test]
    fn genesis_prev_hash_of_all_zeros_is_permitted() {
        assert!(chain_hash(GENESIS_HASH, &json!({"a": 1})).is_ok());
    }

    #[test]
    fn output_is_64_char_lowercase_hex() {
        let h = chain_hash(GENESIS_HASH, &json!({"a": 1})).unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn canonical_order_independence() {
        // Testable property 7: payloads differing only in key insertion
        // order hash identically.
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(
            chain_hash(GENESIS_HASH, &a).unwrap(),
            chain_hash(GENESIS_HASH, &b).unwrap()
        );
    }

    #[test]
    fn different_prev_hash_changes_digest() {
        let payload = json!({"a": 1});
        let h1 = chain_hash(GENESIS_HASH, &payload).unwrap();
        let h2 = chain_hash(&h1, &payload).unwrap();
        assert_ne!(h1, h2);
    }
}
