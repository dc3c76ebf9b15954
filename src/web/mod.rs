use axum::{
    Json, Router,
    extract::State,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::services::{ChannelService, MessageService};
use crate::events::dispatcher::EventDispatcher;
use crate::events::listener::ChangeListener;
use crate::server::config::ServerConfig;
use crate::version::VERSION;
use crate::ws::WsRoomRegistry;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod websocket_handler;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub channels: ChannelService,
    pub messages: MessageService,
    pub dispatcher: Arc<EventDispatcher>,
    pub registry: Arc<WsRoomRegistry>,
    pub listener: Arc<ChangeListener>,
}

async fn health_check_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "listener": if app_state.listener.is_healthy() { "listening" } else { "down" },
    }))
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .nest("/api/channels", routes::channel_routes::create_channels_router())
        .nest("/api/messages", routes::message_routes::create_messages_router())
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth::auth,
        ));

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/ws", get(websocket_handler::websocket_handler))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
