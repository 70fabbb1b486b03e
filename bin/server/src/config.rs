//! Centralized server configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables (`__` separates nesting, e.g. `BROKER__URL`).

use amber_relay_automation::broker::BrokerConfig;
use amber_relay_email::SmtpConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// HTTP listener configuration.
    #[serde(default)]
    pub http: HttpConfig,

    /// Message broker configuration.
    pub broker: BrokerSettings,

    /// SMTP configuration for the email composer.
    pub smtp: SmtpConfig,

    /// Engine tuning knobs.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to bind the operational HTTP surface to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Message broker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    /// NATS server URL.
    pub url: String,
    /// Override for the events stream name.
    #[serde(default)]
    pub events_stream_name: Option<String>,
    /// Override for the durable consumer name.
    #[serde(default)]
    pub consumer_name: Option<String>,
}

impl BrokerSettings {
    /// Converts to the broker crate's config type.
    #[must_use]
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            url: self.url.clone(),
            events_stream_name: self.events_stream_name.clone(),
            consumer_name: self.consumer_name.clone(),
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Per-activation action step budget.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Interval between wait sweeps, in seconds.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Maximum due executions resumed per sweep.
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch: usize,
}

fn default_max_steps() -> u32 {
    amber_relay_automation::interpreter::DEFAULT_MAX_STEPS
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_sweep_batch() -> usize {
    amber_relay_scheduler::sweeper::DEFAULT_SWEEP_BATCH
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            sweep_batch: default_sweep_batch(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
