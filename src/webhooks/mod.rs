//! Outbound webhook delivery for system-originated channel events.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub mod sender;

pub use sender::WebhookSender;

/// Wire body POSTed to every configured URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub message_id: Uuid,
    pub channel: String,
    pub event_name: String,
    pub payload: serde_json::Value,
}

/// Per-URL result of one delivery attempt. Failures are data, never errors:
/// a down endpoint must not abort its siblings.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub url: String,
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Delivery seam between the dispatcher and the HTTP client, so fan-out
/// accounting is testable without a network.
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    /// Delivers the payload to every URL concurrently and reports one
    /// outcome per URL, in input order.
    async fn send_to_all(&self, urls: &[String], payload: &WebhookPayload) -> Vec<WebhookOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_to_the_wire_contract() {
        let payload = WebhookPayload {
            message_id: "6f2b9f64-8d1e-4b5a-9c3e-0a1b2c3d4e5f".parse().unwrap(),
            channel: "orders".to_string(),
            event_name: "order.created".to_string(),
            payload: serde_json::json!({"id": 42}),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "messageId": "6f2b9f64-8d1e-4b5a-9c3e-0a1b2c3d4e5f",
                "channel": "orders",
                "eventName": "order.created",
                "payload": {"id": 42}
            })
        );
    }
}
