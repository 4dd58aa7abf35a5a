// HTTP implementation of AlertDispatcher.
//
// Publishes each alert as a JSON POST to the configured topic endpoint.
// The endpoint owns fan-out to the final destination (email relay etc.);
// this side only cares whether the handoff succeeded.
//
// Error classification drives the orchestrator's retry behavior:
// - transport errors and 5xx responses are transient (worth retrying)
// - 4xx responses are permanent (bad topic, bad credentials - retrying
//   the same request cannot succeed)

use crate::core::moderation::{AlertDispatcher, AlertMessage, DispatchError};
use async_trait::async_trait;
use reqwest::Client;

pub struct WebhookDispatcher {
    client: Client,
    topic_url: String,
}

impl WebhookDispatcher {
    pub fn new(topic_url: String) -> Self {
        Self {
            client: Client::new(),
            topic_url,
        }
    }
}

#[async_trait]
impl AlertDispatcher for WebhookDispatcher {
    async fn publish(&self, message: &AlertMessage) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.topic_url)
            .json(message)
            .send()
            .await
            .map_err(|e| DispatchError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                record_id = %message.record_id,
                idempotency_key = %message.idempotency_key,
                "alert delivered to topic"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(DispatchError::Permanent(format!(
                "topic rejected alert: {} - {}",
                status, body
            )))
        } else {
            Err(DispatchError::Transient(format!(
                "topic error: {} - {}",
                status, body
            )))
        }
    }
}
