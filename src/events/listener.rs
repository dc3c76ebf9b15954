use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgListener, PgNotification};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::services::{ChannelService, MessageService};
use crate::events::dispatcher::EventDispatcher;
use crate::events::envelope::ChangeEvent;

/// The single notification topic the storage trigger publishes on.
pub const EVENT_TOPIC: &str = "channelcast_events";

/// Lifecycle of the listening connection.
///
/// `Closed` is terminal and distinct from `Disconnected`: a closed listener
/// never auto-reconnects, while a disconnected one either has a reconnect
/// pending or has exhausted its attempts and waits for an external
/// `initialize()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Listening,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Connection string for the dedicated listening connection.
    pub database_url: String,
    /// First retry waits this long; each further retry doubles it.
    pub backoff_base: Duration,
    /// Consecutive failures tolerated before the listener gives up.
    pub max_reconnect_attempts: u32,
}

/// Delay before the nth reconnect attempt (1-based): `base * 2^(n-1)`.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Holds exactly one live LISTEN subscription on a dedicated connection and
/// turns each notification into a dispatch call.
///
/// The connection is deliberately not drawn from the shared pool: LISTEN
/// keeps it open for the life of the subscription, which would starve the
/// pool for request-serving queries.
pub struct ChangeListener {
    config: ListenerConfig,
    dispatcher: Arc<EventDispatcher>,
    channels: ChannelService,
    messages: MessageService,
    state: watch::Sender<ListenerState>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeListener {
    pub fn new(
        config: ListenerConfig,
        dispatcher: Arc<EventDispatcher>,
        channels: ChannelService,
        messages: MessageService,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            dispatcher,
            channels,
            messages,
            state,
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Observe state transitions, mostly useful in tests and health probes.
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == ListenerState::Listening
    }

    /// Spawns the listening task. Calling this while the task is still live
    /// is a no-op, so at most one connection and one pending reconnect timer
    /// exist at any time. After `close()` or attempt exhaustion, calling it
    /// again starts a fresh task.
    pub async fn initialize(self: Arc<Self>) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("change listener already running");
                return;
            }
        }
        self.shutdown.send_replace(false);
        self.state.send_replace(ListenerState::Disconnected);
        let this = Arc::clone(&self);
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Cancels any pending reconnect timer, tears down the subscription and
    /// moves to the terminal `Closed` state.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.state.send_replace(ListenerState::Closed);
        info!("change listener closed");
    }

    async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return;
            }
            self.state.send_replace(ListenerState::Connecting);
            match self.connect().await {
                Ok(mut pg) => {
                    attempt = 0;
                    self.state.send_replace(ListenerState::Listening);
                    info!(topic = EVENT_TOPIC, "change listener connected");
                    if self.recv_loop(&mut pg, &mut shutdown).await {
                        self.state.send_replace(ListenerState::Disconnected);
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "change listener failed to connect");
                }
            }
            self.state.send_replace(ListenerState::Disconnected);

            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                error!(
                    attempts = attempt - 1,
                    "change listener exhausted reconnect attempts; staying down until re-initialized"
                );
                return;
            }
            let delay = reconnect_delay(self.config.backoff_base, attempt);
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "scheduling listener reconnect"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect(&self.config.database_url).await?;
        listener.listen(EVENT_TOPIC).await?;
        Ok(listener)
    }

    /// Receives notifications until the connection drops (returns `false`)
    /// or shutdown is requested (returns `true`).
    async fn recv_loop(
        &self,
        pg: &mut PgListener,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            tokio::select! {
                result = pg.recv() => match result {
                    Ok(notification) => self.handle_notification(notification).await,
                    Err(e) => {
                        warn!(error = %e, "change listener connection lost");
                        return false;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return true;
                    }
                }
            }
        }
    }

    async fn handle_notification(&self, notification: PgNotification) {
        let event = match ChangeEvent::parse(notification.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, payload = notification.payload(), "dropping malformed event envelope");
                return;
            }
        };

        let Some(channel_id) = event.channel_id else {
            debug!(message_id = %event.message_id, "event carries no channel id, dropping");
            return;
        };

        let channel = match self.channels.get_by_id(channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                debug!(channel_id = %channel_id, "channel not found, dropping event");
                return;
            }
            Err(e) => {
                error!(error = %e, channel_id = %channel_id, "channel lookup failed, dropping event");
                return;
            }
        };
        if !channel.enabled {
            debug!(channel = %channel.name, "channel disabled, dropping event");
            return;
        }

        let stats = self.dispatcher.dispatch(&event, &channel).await;
        if let Err(e) = self
            .messages
            .update_delivery_stats(event.message_id, &stats)
            .await
        {
            error!(error = %e, message_id = %event.message_id, "failed to record delivery stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::WebhookSender;
    use crate::ws::WsRoomRegistry;
    use sqlx::PgPool;

    #[test]
    fn reconnect_delay_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(reconnect_delay(base, 1), Duration::from_millis(500));
        assert_eq!(reconnect_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(base, 6), Duration::from_millis(16000));
    }

    #[test]
    fn reconnect_delay_saturates_instead_of_overflowing() {
        let base = Duration::from_millis(500);
        let huge = reconnect_delay(base, 64);
        assert!(huge >= reconnect_delay(base, 32));
    }

    fn test_listener(max_attempts: u32) -> Arc<ChangeListener> {
        // Points at a closed port; connect attempts fail fast and no query
        // ever runs against the lazy pool.
        let url = "postgres://127.0.0.1:1/unreachable".to_string();
        let pool = PgPool::connect_lazy(&url).unwrap();
        let channels = ChannelService::new(pool.clone());
        let messages = MessageService::new(pool);
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(WsRoomRegistry::new()),
            Arc::new(WebhookSender::new(Duration::from_secs(1)).unwrap()),
            channels.clone(),
            messages.clone(),
        ));
        Arc::new(ChangeListener::new(
            ListenerConfig {
                database_url: url,
                backoff_base: Duration::from_millis(10),
                max_reconnect_attempts: max_attempts,
            },
            dispatcher,
            channels,
            messages,
        ))
    }

    #[tokio::test]
    async fn starts_disconnected_and_unhealthy() {
        let listener = test_listener(3);
        assert_eq!(listener.state(), ListenerState::Disconnected);
        assert!(!listener.is_healthy());
    }

    #[tokio::test]
    async fn exhausting_attempts_leaves_the_listener_disconnected() {
        let listener = test_listener(0);
        let mut states = listener.watch_state();
        listener.clone().initialize().await;

        // With zero allowed retries the task gives up after the first failed
        // connect and parks in Disconnected.
        let waited = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if *states.borrow_and_update() == ListenerState::Disconnected {
                    let task = listener.task.lock().await;
                    if task.as_ref().is_some_and(|t| t.is_finished()) {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "listener never settled in Disconnected");
        assert!(!listener.is_healthy());
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let listener = test_listener(1000);
        listener.clone().initialize().await;
        listener.close().await;
        assert_eq!(listener.state(), ListenerState::Closed);
        assert!(!listener.is_healthy());
    }
}
