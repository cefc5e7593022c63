use std::time::Duration;

/// Runtime settings, each overridable by environment variable.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// A joined connection silent for longer than this is evicted.
    pub idle_timeout: Duration,
    /// Heartbeat sweep period; eviction latency is bounded by
    /// `idle_timeout + sweep_interval`.
    pub sweep_interval: Duration,
    /// A room empty for longer than this is reclaimed.
    pub room_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            idle_timeout: duration_from_env("IDLE_TIMEOUT_SECS", 30),
            sweep_interval: duration_from_env("SWEEP_INTERVAL_SECS", 10),
            room_ttl: duration_from_env("ROOM_TTL_SECS", 300),
        }
    }
}

fn duration_from_env(name: &str, default_secs: u64) -> Duration {
    let secs = match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparseable {}={:?}", name, raw);
            default_secs
        }),
        Err(_) => default_secs,
    };
    Duration::from_secs(secs)
}
