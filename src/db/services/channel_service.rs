use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::db::enums::{CallerRole, Capability};
use crate::db::models::Channel;

const MAX_NAME_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel not found")]
    NotFound,
    #[error("a channel with this name already exists")]
    NameTaken,
    #[error("invalid channel name: {0}")]
    InvalidName(String),
    #[error("invalid webhook url: {0}")]
    InvalidWebhookUrl(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannelInput {
    pub name: String,
    pub description: Option<String>,
    pub webhook_urls: Option<Vec<String>>,
    pub allow_client_send: Option<bool>,
    pub enabled: Option<bool>,
}

/// `name` is deliberately absent: it is the room key and is embedded in
/// persisted messages, so it cannot change after creation.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateChannelInput {
    pub description: Option<String>,
    pub webhook_urls: Option<Vec<String>>,
    pub allow_client_send: Option<bool>,
    pub enabled: Option<bool>,
}

/// Registry of channel definitions, mutated only through the admin routes.
#[derive(Clone)]
pub struct ChannelService {
    pool: PgPool,
}

impl ChannelService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Channel>, ChannelError> {
        let channels = sqlx::query_as::<_, Channel>("SELECT * FROM channels ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(channels)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Channel>, ChannelError> {
        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Channel>, ChannelError> {
        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    pub async fn create(&self, input: CreateChannelInput) -> Result<Channel, ChannelError> {
        let name = input.name.trim().to_string();
        validate_channel_name(&name)?;
        let webhook_urls = input.webhook_urls.unwrap_or_default();
        validate_webhook_urls(&webhook_urls)?;

        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (name, description, webhook_urls, allow_client_send, enabled)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(input.description.unwrap_or_default())
        .bind(&webhook_urls)
        .bind(input.allow_client_send.unwrap_or(false))
        .bind(input.enabled.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ChannelError::NameTaken
            }
            _ => ChannelError::Database(e),
        })?;
        Ok(channel)
    }

    pub async fn update(&self, id: Uuid, input: UpdateChannelInput) -> Result<Channel, ChannelError> {
        if let Some(urls) = &input.webhook_urls {
            validate_webhook_urls(urls)?;
        }

        let channel = sqlx::query_as::<_, Channel>(
            r#"
            UPDATE channels
            SET description = COALESCE($2::text, description),
                webhook_urls = COALESCE($3::text[], webhook_urls),
                allow_client_send = COALESCE($4::boolean, allow_client_send),
                enabled = COALESCE($5::boolean, enabled),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.description)
        .bind(input.webhook_urls)
        .bind(input.allow_client_send)
        .bind(input.enabled)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ChannelError::NotFound)?;
        Ok(channel)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ChannelError> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ChannelError::NotFound);
        }
        Ok(())
    }
}

/// Policy decision point for join/send authorization, data-driven from the
/// channel configuration. Denial is a valid boolean outcome, not an error;
/// "channel not found" is the caller's problem to distinguish beforehand.
pub fn check_permission(channel: &Channel, capability: Capability, role: CallerRole) -> bool {
    match capability {
        Capability::Join => channel.enabled,
        Capability::Send => channel.allow_client_send || role.is_admin(),
    }
}

fn validate_channel_name(name: &str) -> Result<(), ChannelError> {
    if name.is_empty() {
        return Err(ChannelError::InvalidName("name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ChannelError::InvalidName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(|c| c.is_whitespace()) {
        return Err(ChannelError::InvalidName(
            "name must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

fn validate_webhook_urls(urls: &[String]) -> Result<(), ChannelError> {
    for raw in urls {
        let parsed = Url::parse(raw).map_err(|_| ChannelError::InvalidWebhookUrl(raw.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ChannelError::InvalidWebhookUrl(raw.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(enabled: bool, allow_client_send: bool) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: "orders".to_string(),
            description: String::new(),
            webhook_urls: vec![],
            allow_client_send,
            enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn any_caller_may_join_an_enabled_channel() {
        let ch = channel(true, false);
        assert!(check_permission(&ch, Capability::Join, CallerRole::User));
        assert!(check_permission(&ch, Capability::Join, CallerRole::Admin));
    }

    #[test]
    fn nobody_joins_a_disabled_channel() {
        let ch = channel(false, true);
        assert!(!check_permission(&ch, Capability::Join, CallerRole::User));
        assert!(!check_permission(&ch, Capability::Join, CallerRole::Admin));
    }

    #[test]
    fn send_requires_public_flag_or_admin() {
        let locked = channel(true, false);
        assert!(!check_permission(&locked, Capability::Send, CallerRole::User));
        assert!(check_permission(&locked, Capability::Send, CallerRole::Admin));

        let open = channel(true, true);
        assert!(check_permission(&open, Capability::Send, CallerRole::User));
    }

    #[test]
    fn send_permission_ignores_the_enabled_flag() {
        // Disabled channels still accept (and persist) sends; delivery is
        // suppressed elsewhere.
        let ch = channel(false, true);
        assert!(check_permission(&ch, Capability::Send, CallerRole::User));
    }

    #[test]
    fn webhook_urls_must_be_absolute_http() {
        assert!(validate_webhook_urls(&["https://hook.example/a".to_string()]).is_ok());
        assert!(validate_webhook_urls(&["http://hook.example/b".to_string()]).is_ok());
        assert!(validate_webhook_urls(&["ftp://hook.example/c".to_string()]).is_err());
        assert!(validate_webhook_urls(&["/relative/path".to_string()]).is_err());
        assert!(validate_webhook_urls(&["not a url".to_string()]).is_err());
    }

    #[test]
    fn channel_names_are_validated() {
        assert!(validate_channel_name("orders").is_ok());
        assert!(validate_channel_name("order.created-v2_x").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("has space").is_err());
        assert!(validate_channel_name(&"x".repeat(200)).is_err());
    }
}
