use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// An unparseable notification payload. Dropped and logged, never retried:
/// the source transmitted it exactly once, so a retry would need re-emission
/// from the source side.
#[derive(Debug, Error)]
#[error("malformed event envelope: {0}")]
pub struct MalformedEvent(#[from] serde_json::Error);

/// JSON envelope carried on the notification topic.
///
/// The message row behind `message_id` already exists when this arrives
/// (insert-then-notify), which is what lets the listener write delivery
/// stats back by id.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    pub message_id: Uuid,
    /// Null when the channel was deleted between insert and notify.
    pub channel_id: Option<Uuid>,
    pub channel_name: String,
    pub event_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChangeEvent {
    pub fn parse(raw: &str) -> Result<Self, MalformedEvent> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_envelope() {
        let raw = r#"{
            "message_id": "6f2b9f64-8d1e-4b5a-9c3e-0a1b2c3d4e5f",
            "channel_id": "11111111-2222-3333-4444-555555555555",
            "channel_name": "orders",
            "event_name": "order.created",
            "payload": {"id": 42}
        }"#;
        let event = ChangeEvent::parse(raw).unwrap();
        assert_eq!(event.channel_name, "orders");
        assert_eq!(event.event_name, "order.created");
        assert_eq!(event.payload["id"], 42);
        assert!(event.channel_id.is_some());
    }

    #[test]
    fn payload_defaults_to_null_when_absent() {
        let raw = r#"{
            "message_id": "6f2b9f64-8d1e-4b5a-9c3e-0a1b2c3d4e5f",
            "channel_id": null,
            "channel_name": "orders",
            "event_name": "order.created"
        }"#;
        let event = ChangeEvent::parse(raw).unwrap();
        assert!(event.channel_id.is_none());
        assert!(event.payload.is_null());
    }

    #[test]
    fn rejects_non_json_payloads() {
        assert!(ChangeEvent::parse("not json at all").is_err());
    }

    #[test]
    fn rejects_envelopes_missing_required_fields() {
        assert!(ChangeEvent::parse(r#"{"channel_name": "orders"}"#).is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        let raw = r#"{
            "message_id": "not-a-uuid",
            "channel_id": null,
            "channel_name": "orders",
            "event_name": "order.created"
        }"#;
        assert!(ChangeEvent::parse(raw).is_err());
    }
}
