//! Client API key authentication.
//!
//! Keys are loaded once at startup and held only as SHA-256 digests. A
//! request is checked against every digest so the time taken does not depend
//! on which key matched.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

use crate::error::GatewayError;

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The configured client keys.
#[derive(Debug, Clone, Default)]
pub struct ClientKeySet {
    digests: Vec<String>,
}

impl ClientKeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut digests: Vec<String> = keys
            .into_iter()
            .map(|k| hex_sha256(k.as_ref()))
            .collect();
        digests.sort();
        digests.dedup();
        Self { digests }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn verify(&self, key: &str) -> bool {
        let digest = hex_sha256(key);
        let mut matched = false;
        for known in &self.digests {
            if constant_time_eq(&digest, known) {
                matched = true;
            }
        }
        matched
    }
}

/// Check the bearer token of a request.
///
/// With no keys configured the service is unusable rather than open, so that
/// case is reported before the header is even looked at.
pub fn authorize(headers: &HeaderMap, keys: &ClientKeySet) -> Result<(), GatewayError> {
    if keys.is_empty() {
        return Err(GatewayError::KeysNotConfigured);
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(GatewayError::MissingApiKey)?;

    if keys.verify(token) {
        Ok(())
    } else {
        Err(GatewayError::InvalidApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn constant_time_eq_compares_whole_strings() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn key_set_stores_digests_only() {
        let keys = ClientKeySet::new(["sk-one", "sk-two", "sk-one"]);
        assert_eq!(keys.digests.len(), 2);
        assert!(keys.verify("sk-two"));
        assert!(!keys.verify("sk-three"));
        assert!(keys.digests.iter().all(|d| d.len() == 64 && !d.contains("sk-")));
    }

    #[test]
    fn no_keys_means_unavailable() {
        let err = authorize(&bearer("Bearer anything"), &ClientKeySet::default()).unwrap_err();
        assert!(matches!(err, GatewayError::KeysNotConfigured));
    }

    #[test]
    fn missing_or_malformed_header_is_unauthorized() {
        let keys = ClientKeySet::new(["sk-one"]);
        assert!(matches!(
            authorize(&HeaderMap::new(), &keys),
            Err(GatewayError::MissingApiKey)
        ));
        assert!(matches!(
            authorize(&bearer("Basic c2stb25l"), &keys),
            Err(GatewayError::MissingApiKey)
        ));
        assert!(matches!(
            authorize(&bearer("Bearer "), &keys),
            Err(GatewayError::MissingApiKey)
        ));
    }

    #[test]
    fn wrong_key_is_forbidden_and_right_key_passes() {
        let keys = ClientKeySet::new(["sk-one"]);
        assert!(matches!(
            authorize(&bearer("Bearer sk-nope"), &keys),
            Err(GatewayError::InvalidApiKey)
        ));
        assert!(authorize(&bearer("Bearer sk-one"), &keys).is_ok());
    }
}
