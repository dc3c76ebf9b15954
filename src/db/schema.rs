//! Idempotent schema bootstrap, run once at startup.
//!
//! The `messages` trigger is what wires the source side of event delivery:
//! a system-originated insert lands first, then the trigger NOTIFYs the
//! envelope on the event topic, so the listener can always resolve the row
//! by id when it writes delivery stats back. Client-originated rows do not
//! fire the trigger; the dispatcher fans those out in-process.

use sqlx::PgPool;

const CREATE_CHANNELS: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    webhook_urls TEXT[] NOT NULL DEFAULT '{}',
    allow_client_send BOOLEAN NOT NULL DEFAULT FALSE,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    channel_id UUID REFERENCES channels(id) ON DELETE SET NULL,
    channel_name TEXT NOT NULL,
    event_name TEXT NOT NULL,
    payload JSONB NOT NULL DEFAULT '{}',
    sender_type TEXT NOT NULL CHECK (sender_type IN ('system', 'client')),
    ws_audience_count INTEGER NOT NULL DEFAULT 0,
    wh_audience_count INTEGER NOT NULL DEFAULT 0,
    wh_delivered_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_MESSAGES_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_channel_name ON messages(channel_name);
CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at DESC)
"#;

const CREATE_NOTIFY_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION channelcast_notify_event() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('channelcast_events', json_build_object(
        'message_id', NEW.id,
        'channel_id', NEW.channel_id,
        'channel_name', NEW.channel_name,
        'event_name', NEW.event_name,
        'payload', NEW.payload
    )::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql
"#;

const DROP_NOTIFY_TRIGGER: &str = "DROP TRIGGER IF EXISTS messages_notify_system_event ON messages";

const CREATE_NOTIFY_TRIGGER: &str = r#"
CREATE TRIGGER messages_notify_system_event
AFTER INSERT ON messages
FOR EACH ROW
WHEN (NEW.sender_type = 'system')
EXECUTE FUNCTION channelcast_notify_event()
"#;

/// Creates tables, indexes and the event trigger if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_CHANNELS).execute(pool).await?;
    sqlx::query(CREATE_MESSAGES).execute(pool).await?;
    sqlx::raw_sql(CREATE_MESSAGES_INDEXES).execute(pool).await?;
    sqlx::query(CREATE_NOTIFY_FUNCTION).execute(pool).await?;
    sqlx::query(DROP_NOTIFY_TRIGGER).execute(pool).await?;
    sqlx::query(CREATE_NOTIFY_TRIGGER).execute(pool).await?;
    tracing::info!("database schema ensured");
    Ok(())
}
