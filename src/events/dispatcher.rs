use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::enums::{CallerRole, Capability, SenderType};
use crate::db::models::{Channel, Message};
use crate::db::services::{ChannelService, MessageService, check_permission};
use crate::events::envelope::ChangeEvent;
use crate::webhooks::{WebhookDelivery, WebhookPayload};
use crate::ws::RoomRegistry;

/// Aggregate delivery counts for one dispatch attempt, folded into the
/// message row by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub ws_audience_count: i32,
    pub wh_audience_count: i32,
    pub wh_delivered_count: i32,
}

/// A client publish that could not be accepted. Denial is a structured
/// outcome the route layer turns into a response body, not a 500.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("channel not found")]
    ChannelNotFound,
    #[error("not authorized to send on this channel")]
    Unauthorized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fans one event out to the WebSocket room and the channel's webhooks, and
/// reports aggregate counts. One instance per process, owned by startup.
pub struct EventDispatcher {
    registry: Arc<dyn RoomRegistry>,
    webhooks: Arc<dyn WebhookDelivery>,
    channels: ChannelService,
    messages: MessageService,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<dyn RoomRegistry>,
        webhooks: Arc<dyn WebhookDelivery>,
        channels: ChannelService,
        messages: MessageService,
    ) -> Self {
        Self {
            registry,
            webhooks,
            channels,
            messages,
        }
    }

    /// System-originated entry point: WebSocket broadcast plus webhook
    /// fan-out. The caller persists the returned stats.
    pub async fn dispatch(&self, event: &ChangeEvent, channel: &Channel) -> DeliveryStats {
        self.fan_out(channel, event.message_id, &event.event_name, &event.payload, true)
            .await
    }

    /// Client-originated entry point: permission check, insert, WebSocket
    /// broadcast only. Webhooks never fire here so end users cannot trigger
    /// arbitrary outbound HTTP calls.
    pub async fn publish(
        &self,
        channel_name: &str,
        event_name: &str,
        payload: serde_json::Value,
        caller_id: i32,
        caller_role: CallerRole,
    ) -> Result<Message, PublishError> {
        let channel = self
            .channels
            .get_by_name(channel_name)
            .await
            .map_err(|e| match e {
                crate::db::services::ChannelError::Database(db) => PublishError::Database(db),
                _ => PublishError::ChannelNotFound,
            })?
            .ok_or(PublishError::ChannelNotFound)?;

        if !check_permission(&channel, Capability::Send, caller_role) {
            debug!(channel = %channel.name, caller_id, "client publish denied");
            return Err(PublishError::Unauthorized);
        }

        let message = self
            .messages
            .insert(&channel, event_name, &payload, SenderType::Client)
            .await?;

        // A disabled channel still persists the row; it just delivers nowhere.
        let stats = if channel.enabled {
            self.fan_out(&channel, message.id, event_name, &payload, false)
                .await
        } else {
            debug!(channel = %channel.name, "channel disabled, skipping fan-out");
            DeliveryStats::default()
        };
        self.messages.update_delivery_stats(message.id, &stats).await?;
        Ok(message)
    }

    async fn fan_out(
        &self,
        channel: &Channel,
        message_id: Uuid,
        event_name: &str,
        payload: &serde_json::Value,
        include_webhooks: bool,
    ) -> DeliveryStats {
        let room = channel.name.as_str();
        // Audience is the membership at broadcast time. WebSocket delivery is
        // fire-and-forget and unacknowledged, so the size is read before the
        // broadcast rather than counting confirmed receipts.
        let ws_audience_count = self.registry.room_size(room) as i32;
        self.registry.broadcast(room, event_name, payload);

        let mut stats = DeliveryStats {
            ws_audience_count,
            ..DeliveryStats::default()
        };

        if include_webhooks && !channel.webhook_urls.is_empty() {
            let body = WebhookPayload {
                message_id,
                channel: channel.name.clone(),
                event_name: event_name.to_string(),
                payload: payload.clone(),
            };
            let outcomes = self.webhooks.send_to_all(&channel.webhook_urls, &body).await;
            stats.wh_audience_count = outcomes.len() as i32;
            stats.wh_delivered_count = outcomes.iter().filter(|o| o.success).count() as i32;
            for outcome in outcomes.iter().filter(|o| !o.success) {
                warn!(
                    url = %outcome.url,
                    status = ?outcome.status,
                    error = ?outcome.error,
                    "webhook delivery failed"
                );
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::WebhookOutcome;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::PgPool;
    use std::sync::Mutex;

    /// Records the order of registry calls so the "size before broadcast"
    /// contract stays observable.
    #[derive(Default)]
    struct FakeRegistry {
        size: usize,
        calls: Mutex<Vec<String>>,
        broadcasts: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    impl RoomRegistry for FakeRegistry {
        fn room_size(&self, _room: &str) -> usize {
            self.calls.lock().unwrap().push("room_size".to_string());
            self.size
        }

        fn broadcast(&self, room: &str, event_name: &str, payload: &serde_json::Value) {
            self.calls.lock().unwrap().push("broadcast".to_string());
            self.broadcasts.lock().unwrap().push((
                room.to_string(),
                event_name.to_string(),
                payload.clone(),
            ));
        }
    }

    #[derive(Default)]
    struct FakeWebhooks {
        results: Vec<bool>,
        calls: Mutex<Vec<(Vec<String>, WebhookPayload)>>,
    }

    #[async_trait]
    impl WebhookDelivery for FakeWebhooks {
        async fn send_to_all(
            &self,
            urls: &[String],
            payload: &WebhookPayload,
        ) -> Vec<WebhookOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((urls.to_vec(), payload.clone()));
            urls.iter()
                .zip(self.results.iter().copied().chain(std::iter::repeat(true)))
                .map(|(url, success)| WebhookOutcome {
                    url: url.clone(),
                    success,
                    status: success.then_some(200),
                    error: (!success).then(|| "timed out".to_string()),
                })
                .collect()
        }
    }

    fn channel_with_urls(urls: Vec<String>) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: "orders".to_string(),
            description: String::new(),
            webhook_urls: urls,
            allow_client_send: false,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn dispatcher(
        registry: Arc<FakeRegistry>,
        webhooks: Arc<FakeWebhooks>,
    ) -> EventDispatcher {
        // Lazy pool: never connected, the fan-out path does not touch it.
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        EventDispatcher::new(
            registry,
            webhooks,
            ChannelService::new(pool.clone()),
            MessageService::new(pool),
        )
    }

    fn event_for(channel: &Channel) -> ChangeEvent {
        ChangeEvent {
            message_id: Uuid::new_v4(),
            channel_id: Some(channel.id),
            channel_name: channel.name.clone(),
            event_name: "order.created".to_string(),
            payload: serde_json::json!({"id": 42}),
        }
    }

    #[tokio::test]
    async fn dispatch_counts_both_transports() {
        let registry = Arc::new(FakeRegistry {
            size: 3,
            ..FakeRegistry::default()
        });
        let webhooks = Arc::new(FakeWebhooks {
            results: vec![true, false],
            ..FakeWebhooks::default()
        });
        let channel = channel_with_urls(vec![
            "https://hook.example/a".to_string(),
            "https://hook.example/b".to_string(),
        ]);
        let event = event_for(&channel);

        let stats = dispatcher(registry.clone(), webhooks.clone())
            .dispatch(&event, &channel)
            .await;

        assert_eq!(
            stats,
            DeliveryStats {
                ws_audience_count: 3,
                wh_audience_count: 2,
                wh_delivered_count: 1,
            }
        );

        let broadcasts = registry.broadcasts.lock().unwrap();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, "orders");
        assert_eq!(broadcasts[0].1, "order.created");

        let calls = webhooks.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.channel, "orders");
        assert_eq!(calls[0].1.message_id, event.message_id);
    }

    #[tokio::test]
    async fn room_size_is_read_before_the_broadcast() {
        let registry = Arc::new(FakeRegistry {
            size: 5,
            ..FakeRegistry::default()
        });
        let webhooks = Arc::new(FakeWebhooks::default());
        let channel = channel_with_urls(vec![]);
        let event = event_for(&channel);

        dispatcher(registry.clone(), webhooks).dispatch(&event, &channel).await;

        let calls = registry.calls.lock().unwrap();
        assert_eq!(*calls, vec!["room_size".to_string(), "broadcast".to_string()]);
    }

    #[tokio::test]
    async fn no_webhook_call_without_configured_urls() {
        let registry = Arc::new(FakeRegistry::default());
        let webhooks = Arc::new(FakeWebhooks::default());
        let channel = channel_with_urls(vec![]);
        let event = event_for(&channel);

        let stats = dispatcher(registry, webhooks.clone()).dispatch(&event, &channel).await;

        assert_eq!(stats.wh_audience_count, 0);
        assert_eq!(stats.wh_delivered_count, 0);
        assert!(webhooks.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_fan_out_never_touches_webhooks() {
        let registry = Arc::new(FakeRegistry {
            size: 2,
            ..FakeRegistry::default()
        });
        let webhooks = Arc::new(FakeWebhooks::default());
        let channel = channel_with_urls(vec!["https://hook.example/a".to_string()]);
        let d = dispatcher(registry.clone(), webhooks.clone());

        let stats = d
            .fan_out(
                &channel,
                Uuid::new_v4(),
                "msg",
                &serde_json::json!({"text": "hi"}),
                false,
            )
            .await;

        assert_eq!(stats.ws_audience_count, 2);
        assert_eq!(stats.wh_audience_count, 0);
        assert_eq!(stats.wh_delivered_count, 0);
        assert!(webhooks.calls.lock().unwrap().is_empty());
        assert_eq!(registry.broadcasts.lock().unwrap().len(), 1);
    }
}
