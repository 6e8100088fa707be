//! Response helpers shared by every adapter.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Longest error body kept in [`ProviderError::Api`].
const MAX_ERROR_BODY: usize = 2048;

/// Send `request`, abandoning it if `cancel` fires first, and check the
/// status code.
pub async fn send(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, ProviderError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        response = request.send() => response?,
    };
    ensure_success(response).await
}

/// [`send`] followed by JSON decoding of the body.
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T, ProviderError> {
    let response = send(request, cancel).await?;
    let bytes = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        bytes = response.bytes() => bytes?,
    };
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::protocol("invalid JSON body", e))
}

/// Whether the response declares a JSON (rather than event-stream) body.
pub fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`ProviderError::Api`] containing the status
/// and (truncated) body text on failure.
pub async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        truncate(&mut body, MAX_ERROR_BODY);
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::protocol("invalid JSON body", e))
}

fn truncate(body: &mut String, max: usize) {
    if body.len() <= max {
        return;
    }
    let mut cut = max;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body.push_str("...");
}
