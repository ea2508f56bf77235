//! Shared HTTP handling for provider adapters.
//!
//! Every adapter funnels its requests through [`send_json`] so non-2xx
//! responses are classified the same way and keep their status and raw body.

use crate::error::{GenerationCause, ProviderError, ProviderResult};
use serde_json::Value;

/// Which error family a failed request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Upload,
    Generate,
}

impl Operation {
    pub(crate) fn failure(
        self,
        provider: &str,
        cause: GenerationCause,
        message: String,
        status_code: Option<u16>,
    ) -> ProviderError {
        match self {
            Operation::Upload => ProviderError::Upload {
                provider: provider.to_string(),
                message,
                status_code,
            },
            Operation::Generate => ProviderError::Generation {
                provider: provider.to_string(),
                cause,
                message,
                status_code,
            },
        }
    }
}

const POLICY_MARKERS: [&str; 5] = [
    "content policy",
    "content_policy",
    "safety",
    "nsfw",
    "moderation",
];

/// Classify a failed response by status code and body text.
pub(crate) fn classify(status: u16, body: &str) -> GenerationCause {
    let lower = body.to_ascii_lowercase();
    if status == 451 || POLICY_MARKERS.iter().any(|m| lower.contains(m)) {
        GenerationCause::ContentPolicy
    } else if matches!(status, 400 | 404 | 422) {
        GenerationCause::Validation
    } else {
        GenerationCause::Transport
    }
}

/// Send a request and decode a JSON body, mapping every failure mode.
pub(crate) async fn send_json(
    provider: &str,
    op: Operation,
    request: reqwest::RequestBuilder,
) -> ProviderResult<Value> {
    let resp = request.send().await.map_err(|e| {
        op.failure(
            provider,
            GenerationCause::Transport,
            format!("request failed: {e}"),
            None,
        )
    })?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let cause = classify(status.as_u16(), &text);
        return Err(op.failure(
            provider,
            cause,
            format!("HTTP {status}: {text}"),
            Some(status.as_u16()),
        ));
    }

    resp.json::<Value>()
        .await
        .map_err(|e| ProviderError::parse(provider, format!("response is not JSON: {e}")))
}

/// Build a client with the given request timeout.
pub(crate) fn client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}
