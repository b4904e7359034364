//! Outbound message delivery.

use async_trait::async_trait;
use thiserror::Error;

use tidings_core::Identifier;

/// Delivery failure, surfaced verbatim into the failed job's error text.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The downstream endpoint answered with a non-success status.
    #[error("delivery rejected with status {0}")]
    Rejected(u16),

    #[error("delivery failed: {0}")]
    Network(String),
}

/// Something that can push a rendered message to the outside world.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, recipient: &Identifier, body: &str) -> Result<(), TransportError>;
}

/// Webhook delivery: POSTs `{"message": body}` as JSON to a fixed endpoint.
pub struct HttpDeliveryTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDeliveryTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DeliveryTransport for HttpDeliveryTransport {
    async fn deliver(&self, recipient: &Identifier, body: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "message": body }))
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        if response.status().is_success() {
            tracing::debug!(recipient = %recipient, "message delivered");
            Ok(())
        } else {
            Err(TransportError::Rejected(response.status().as_u16()))
        }
    }
}
