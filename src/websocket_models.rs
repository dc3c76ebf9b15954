use serde::{Deserialize, Serialize};

/// Commands a connected WebSocket client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    Subscribe { channel: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { channel: String },
    Ping,
}

/// Frames pushed from the server to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerPush {
    /// A channel event fanned out to the room.
    #[serde(rename_all = "camelCase")]
    Event {
        channel: String,
        event_name: String,
        payload: serde_json::Value,
    },
    /// Acknowledges a subscribe command. Sent whether or not the channel
    /// exists: absence fails silently by never delivering events.
    #[serde(rename_all = "camelCase")]
    Subscribed { channel: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribed { channel: String },
    Pong,
}
