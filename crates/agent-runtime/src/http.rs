//! Shared HTTP plumbing for the hosted providers.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use reqwest::{Client, Response, StatusCode};

const MAX_ERROR_BODY: usize = 500;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Map a non-success status to the matching error kind
pub(crate) fn classify_status(status: StatusCode, detail: String) -> AgentError {
    match status.as_u16() {
        401 | 403 => AgentError::Auth(detail),
        429 => AgentError::RateLimited(detail),
        500..=599 => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

pub(crate) async fn status_error(provider: &str, response: Response) -> AgentError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();

    tracing::warn!(provider, %status, "Provider request rejected");
    classify_status(status, format!("{provider} returned {status}: {body}"))
}

pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> AgentError {
    if err.is_timeout() || err.is_connect() {
        AgentError::ProviderUnavailable(format!("{provider}: {err}"))
    } else {
        AgentError::Provider(format!("{provider} request failed: {err}"))
    }
}

/// Send, check status, decode JSON
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    if !response.status().is_success() {
        return Err(status_error(provider, response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AgentError::Parse(format!("{provider} response JSON decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(StatusCode::UNAUTHORIZED, String::new()), AgentError::Auth(_)));
        assert!(matches!(classify_status(StatusCode::FORBIDDEN, String::new()), AgentError::Auth(_)));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            AgentError::ProviderUnavailable(_)
        ));
        assert!(matches!(classify_status(StatusCode::BAD_REQUEST, String::new()), AgentError::Provider(_)));
    }
}
