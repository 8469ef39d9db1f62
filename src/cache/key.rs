//! Cache key generation
//!
//! Generic responses are cached under their endpoint (path + query) so the
//! same logical request always maps to one entry. Large values are written to
//! blob files named by the SHA-256 of their key.

use sha2::{Digest, Sha256};

/// Build the cache key for an endpoint and its query parameters.
///
/// Parameters are sorted so the key does not depend on their order. An
/// endpoint without parameters is its own key.
pub fn endpoint_key(endpoint: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }

    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort();

    let query = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}", endpoint, separator, query)
}

/// Hex-encoded SHA-256 of a key, used as a blob file name
pub fn blob_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
