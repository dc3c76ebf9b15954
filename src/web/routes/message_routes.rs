use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    routing::get,
};
use std::sync::Arc;

use crate::db::models::Message;
use crate::db::services::{MessageFilter, MessageStats};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

// --- Route Handlers ---

async fn list_messages_handler(
    Extension(_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(app_state.messages.list(&filter).await?))
}

async fn message_stats_handler(
    Extension(_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<MessageStats>, AppError> {
    Ok(Json(app_state.messages.stats(&filter).await?))
}

// --- Router ---

pub fn create_messages_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_messages_handler))
        .route("/stats", get(message_stats_handler))
}
