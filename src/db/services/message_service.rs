use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::enums::SenderType;
use crate::db::models::{Channel, Message};
use crate::events::dispatcher::DeliveryStats;

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

/// Optional predicates for the operational list/stats queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    pub channel_name: Option<String>,
    pub event_name: Option<String>,
    pub sender_type: Option<SenderType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChannelMessageStats {
    pub channel_name: String,
    pub message_count: i64,
    pub ws_audience_total: i64,
    pub wh_audience_total: i64,
    pub wh_delivered_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageStats {
    pub total_messages: i64,
    pub by_channel: Vec<ChannelMessageStats>,
}

/// Persistence and stats bookkeeping for delivered events.
#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
}

impl MessageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one event record. The channel name is denormalized on purpose:
    /// the row must stay legible after the channel is renamed or deleted.
    pub async fn insert(
        &self,
        channel: &Channel,
        event_name: &str,
        payload: &serde_json::Value,
        sender_type: SenderType,
    ) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (channel_id, channel_name, event_name, payload, sender_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(event_name)
        .bind(payload)
        .bind(sender_type.as_str())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Writes the three delivery counters in one statement keyed by message
    /// id. Calling this twice overwrites; it never accumulates, which is what
    /// makes a re-dispatched message safe to account for.
    pub async fn update_delivery_stats(
        &self,
        message_id: Uuid,
        stats: &DeliveryStats,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE messages
            SET ws_audience_count = $2,
                wh_audience_count = $3,
                wh_delivered_count = $4
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .bind(stats.ws_audience_count)
        .bind(stats.wh_audience_count)
        .bind(stats.wh_delivered_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, sqlx::Error> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE ($1::text IS NULL OR channel_name = $1)
              AND ($2::text IS NULL OR event_name = $2)
              AND ($3::text IS NULL OR sender_type = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.channel_name)
        .bind(&filter.event_name)
        .bind(filter.sender_type.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn stats(&self, filter: &MessageFilter) -> Result<MessageStats, sqlx::Error> {
        let by_channel = sqlx::query_as::<_, ChannelMessageStats>(
            r#"
            SELECT channel_name,
                   COUNT(*) AS message_count,
                   COALESCE(SUM(ws_audience_count), 0)::bigint AS ws_audience_total,
                   COALESCE(SUM(wh_audience_count), 0)::bigint AS wh_audience_total,
                   COALESCE(SUM(wh_delivered_count), 0)::bigint AS wh_delivered_total
            FROM messages
            WHERE ($1::text IS NULL OR channel_name = $1)
              AND ($2::text IS NULL OR event_name = $2)
              AND ($3::text IS NULL OR sender_type = $3)
            GROUP BY channel_name
            ORDER BY message_count DESC, channel_name
            "#,
        )
        .bind(&filter.channel_name)
        .bind(&filter.event_name)
        .bind(filter.sender_type.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let total_messages = by_channel.iter().map(|c| c.message_count).sum();
        Ok(MessageStats {
            total_messages,
            by_channel,
        })
    }
}
