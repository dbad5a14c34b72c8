//! Ephemeral credential fetch from the token endpoint.
//!
//! The shell's backend mints short-lived realtime credentials so the API
//! key never ships in the app. One GET, expected shape
//! `{"client_secret": {"value": "..."}}`; anything else aborts the connect.

use serde::Deserialize;
use tracing::debug;

use crate::error::{BridgeError, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Fetch one ephemeral credential. Non-2xx status or a missing field is a
/// `TokenFetch` error; the caller moves the session to Failed.
pub async fn fetch_ephemeral_token(client: &reqwest::Client, endpoint: &str) -> Result<String> {
    debug!(endpoint, "Fetching ephemeral realtime credential");
    let resp = client
        .get(endpoint)
        .send()
        .await
        .map_err(|e| BridgeError::TokenFetch(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(BridgeError::TokenFetch(format!(
            "token endpoint returned {}",
            status
        )));
    }

    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| BridgeError::TokenFetch(format!("malformed token response: {}", e)))?;
    Ok(body.client_secret.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_shape() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"client_secret":{"value":"ek_abc123"}}"#).unwrap();
        assert_eq!(body.client_secret.value, "ek_abc123");
    }

    #[test]
    fn test_missing_field_fails_deserialization() {
        assert!(serde_json::from_str::<TokenResponse>(r#"{"client_secret":{}}"#).is_err());
        assert!(serde_json::from_str::<TokenResponse>(r#"{}"#).is_err());
    }
}
