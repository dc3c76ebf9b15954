use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::Channel;
use crate::db::services::{CreateChannelInput, UpdateChannelInput};
use crate::events::dispatcher::PublishError;
use crate::web::models::{AuthenticatedUser, PublishRequest, PublishResponse};
use crate::web::{AppState, error::AppError};

// --- Route Handlers ---

fn require_admin(user: &AuthenticatedUser) -> Result<(), AppError> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "administrator role required".to_string(),
        ))
    }
}

async fn list_channels_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Channel>>, AppError> {
    require_admin(&user)?;
    Ok(Json(app_state.channels.list().await?))
}

async fn get_channel_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<Channel>, AppError> {
    require_admin(&user)?;
    let channel = app_state
        .channels
        .get_by_id(channel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Channel not found".to_string()))?;
    Ok(Json(channel))
}

async fn create_channel_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateChannelInput>,
) -> Result<(StatusCode, Json<Channel>), AppError> {
    require_admin(&user)?;
    let channel = app_state.channels.create(payload).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn update_channel_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<UpdateChannelInput>,
) -> Result<Json<Channel>, AppError> {
    require_admin(&user)?;
    let channel = app_state.channels.update(channel_id, payload).await?;
    Ok(Json(channel))
}

async fn delete_channel_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&user)?;
    app_state.channels.delete(channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Client-originated publish. Denials come back as a structured body, not a
/// bare error, so callers can distinguish policy from breakage.
async fn publish_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_name): Path<String>,
    Json(payload): Json<PublishRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    match app_state
        .dispatcher
        .publish(
            &channel_name,
            &payload.event,
            payload.payload,
            user.id,
            user.role,
        )
        .await
    {
        Ok(message) => {
            let body = serde_json::to_value(PublishResponse {
                success: true,
                message_id: message.id,
            })?;
            Ok((StatusCode::CREATED, Json(body)))
        }
        Err(PublishError::Unauthorized) => Ok((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "success": false,
                "error": {
                    "code": "UNAUTHORIZED",
                    "message": "not authorized to send on this channel"
                }
            })),
        )),
        Err(PublishError::ChannelNotFound) => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": {
                    "code": "CHANNEL_NOT_FOUND",
                    "message": "channel not found"
                }
            })),
        )),
        Err(PublishError::Database(e)) => Err(AppError::DatabaseError(e.to_string())),
    }
}

// --- Router ---

pub fn create_channels_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_channels_handler).post(create_channel_handler))
        .route(
            "/{channel}",
            get(get_channel_handler)
                .put(update_channel_handler)
                .delete(delete_channel_handler),
        )
        .route("/{channel}/publish", post(publish_handler))
}
