//! Single-attempt webhook delivery for HTTP(S) alarm actions.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`AlarmTransition`] to an
//! action URL. Each action fires once per transition; a failed attempt is
//! logged and reported to the caller but never retried here.

use std::time::Duration;

use crate::bus::AlarmTransition;

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers alarm transitions to external webhook endpoints.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    /// Create a delivery service with a pre-configured HTTP client. Falls
    /// back to reqwest's default client if the builder cannot be
    /// initialised.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Build the request body sent to webhook targets.
    pub fn payload(transition: &AlarmTransition) -> serde_json::Value {
        serde_json::json!({
            "AlarmName": transition.alarm_name,
            "AlarmArn": transition.alarm_arn,
            "AWSAccountId": transition.account_id,
            "Region": transition.region,
            "OldStateValue": transition.old_state,
            "NewStateValue": transition.new_state,
            "NewStateReason": transition.reason,
            "StateChangeTime": transition.timestamp,
        })
    }

    /// POST the transition to `url` exactly once.
    pub async fn deliver(&self, url: &str, transition: &AlarmTransition) -> Result<(), WebhookError> {
        let payload = Self::payload(transition);
        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

impl Default for WebhookDelivery {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
