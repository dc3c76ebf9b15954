use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named logical topic that events are published on.
/// Corresponds to the `channels` table.
///
/// The name doubles as the WebSocket room key and is embedded into every
/// persisted message, so it is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Outbound delivery targets for system-originated events.
    pub webhook_urls: Vec<String>,
    /// When set, any authenticated caller may publish on this channel.
    /// Otherwise publishing requires an admin role.
    pub allow_client_send: bool,
    /// Disabling suppresses all delivery but not persistence of new messages.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One delivered (or attempted) event, with its delivery accounting.
/// Corresponds to the `messages` table.
///
/// Everything except the three delivery counters is immutable once inserted.
/// `channel_name` is a snapshot, not a live reference, so history stays
/// legible after a channel is deleted; `channel_id` goes null in that case.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Option<Uuid>,
    pub channel_name: String,
    pub event_name: String,
    pub payload: serde_json::Value,
    pub sender_type: String,
    /// Room membership at broadcast time, not acknowledged receipt.
    pub ws_audience_count: i32,
    /// Webhook URLs attempted.
    pub wh_audience_count: i32,
    /// Webhook URLs that answered 2xx within the timeout.
    pub wh_delivered_count: i32,
    pub created_at: DateTime<Utc>,
}
