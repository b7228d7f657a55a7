use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub hub_queue_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

fn default_lock_ttl() -> u64 { 300 }
fn default_sweep_interval() -> u64 { 30 }
fn default_store_timeout() -> u64 { 3000 }
fn default_queue_capacity() -> usize { 256 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: default_lock_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            store_timeout_ms: default_store_timeout(),
            hub_queue_capacity: default_queue_capacity(),
            subscriber_queue_capacity: default_queue_capacity(),
        }
    }
}

impl BookingRules {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

fn default_topic() -> String { "booking_events".to_string() }
fn default_group_id() -> String { "cinema-notifier".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer-local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `CINEMA__BOOKING__LOCK_TTL_SECONDS=120`
            .add_source(config::Environment::with_prefix("CINEMA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_rules_defaults() {
        let rules = BookingRules::default();
        assert_eq!(rules.lock_ttl(), Duration::from_secs(300));
        assert_eq!(rules.sweep_interval(), Duration::from_secs(30));
        assert_eq!(rules.hub_queue_capacity, 256);
    }

    #[test]
    fn test_partial_booking_section_fills_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080
                [database]
                url = "postgres://localhost/cinema"
                [redis]
                url = "redis://localhost:6379"
                [auth]
                jwt_secret = "dev-secret"
                [booking]
                lock_ttl_seconds = 120
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();

        assert_eq!(cfg.booking.lock_ttl_seconds, 120);
        assert_eq!(cfg.booking.sweep_interval_seconds, 30);
        assert_eq!(cfg.database.max_connections, 5);
        assert!(cfg.kafka.is_none());
    }
}
