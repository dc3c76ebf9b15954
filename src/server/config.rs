use std::env;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub jwt_secret: String,
    /// Per-request timeout for outbound webhook deliveries.
    pub webhook_timeout: Duration,
    /// First reconnect delay of the change listener; doubles per attempt.
    pub listener_backoff_base: Duration,
    pub listener_max_reconnect_attempts: u32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;

        let listen_addr =
            env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

        let webhook_timeout = Duration::from_secs(parse_or(
            "WEBHOOK_TIMEOUT_SECS",
            DEFAULT_WEBHOOK_TIMEOUT_SECS,
        )?);

        let listener_backoff_base = Duration::from_millis(parse_or(
            "LISTENER_BACKOFF_BASE_MS",
            DEFAULT_BACKOFF_BASE_MS,
        )?);

        let listener_max_reconnect_attempts = parse_or(
            "LISTENER_MAX_RECONNECT_ATTEMPTS",
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
        )?;

        Ok(ServerConfig {
            database_url,
            listen_addr,
            jwt_secret,
            webhook_timeout,
            listener_backoff_base,
            listener_max_reconnect_attempts,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
