// API key check for mutating routes

use super::error::ApiError;
use super::AppState;
use crate::error::LaundryError;
use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// SHA-256 digest of the configured secret. Candidates are hashed and
/// compared digest to digest, in time independent of where they differ.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    pub fn new(secret: &str) -> Self {
        ApiKey {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Extractor that only succeeds when `x-api-key` matches.
#[derive(Debug, Clone, Copy)]
pub struct RequireApiKey;

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        match provided {
            Some(key) if state.api_key.verify(key) => Ok(RequireApiKey),
            Some(_) => {
                warn!(path = %parts.uri.path(), "rejected invalid API key");
                Err(LaundryError::Unauthorized.into())
            }
            None => Err(LaundryError::Unauthorized.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let key = ApiKey::new("s3cret");
        assert!(key.verify("s3cret"));
        assert!(!key.verify("s3cret "));
        assert!(!key.verify(""));
    }
}
