use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use channelcast::db::schema::ensure_schema;
use channelcast::db::services::{ChannelService, MessageService};
use channelcast::events::dispatcher::EventDispatcher;
use channelcast::events::listener::{ChangeListener, ListenerConfig};
use channelcast::server::config::ServerConfig;
use channelcast::version::VERSION;
use channelcast::web::{AppState, create_axum_router};
use channelcast::webhooks::WebhookSender;
use channelcast::ws::WsRoomRegistry;

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_logging();
    info!(version = VERSION, "starting channelcast server");

    let config = Arc::new(ServerConfig::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    ensure_schema(&pool).await?;

    let channels = ChannelService::new(pool.clone());
    let messages = MessageService::new(pool.clone());
    let registry = Arc::new(WsRoomRegistry::new());
    let webhooks = Arc::new(WebhookSender::new(config.webhook_timeout)?);

    let dispatcher = Arc::new(EventDispatcher::new(
        registry.clone(),
        webhooks,
        channels.clone(),
        messages.clone(),
    ));

    let listener = Arc::new(ChangeListener::new(
        ListenerConfig {
            database_url: config.database_url.clone(),
            backoff_base: config.listener_backoff_base,
            max_reconnect_attempts: config.listener_max_reconnect_attempts,
        },
        dispatcher.clone(),
        channels.clone(),
        messages.clone(),
    ));
    listener.clone().initialize().await;

    let app_state = Arc::new(AppState {
        config: config.clone(),
        channels,
        messages,
        dispatcher,
        registry,
        listener: listener.clone(),
    });
    let router = create_axum_router(app_state);

    let tcp_listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "http server listening");
    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(shutdown_signal(listener))
        .await?;
    Ok(())
}

async fn shutdown_signal(listener: Arc<ChangeListener>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
        return;
    }
    info!("shutdown signal received, closing change listener");
    listener.close().await;
}
