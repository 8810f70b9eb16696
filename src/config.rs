use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub sync: SyncConfig,

    #[command(flatten)]
    pub presence: PresenceConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct SyncConfig {
    /// Debounce window for thread-list reloads triggered by events that
    /// reference a thread not yet in the local list
    #[arg(long, env = "PARTSWAP_RELOAD_DEBOUNCE_MS", default_value_t = 1500)]
    pub reload_debounce_ms: u64,

    /// Timeout applied to interactive store calls
    #[arg(long, env = "PARTSWAP_STORE_TIMEOUT_SECS", default_value_t = 15)]
    pub store_timeout_secs: u64,

    /// Capacity of a change-feed subscription channel
    #[arg(long, env = "PARTSWAP_EVENT_CHANNEL_CAPACITY", default_value_t = 64)]
    pub event_channel_capacity: usize,
}

#[derive(Clone, Debug, Args)]
pub struct PresenceConfig {
    /// How often to refresh the own-user online heartbeat
    #[arg(long, env = "PARTSWAP_HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "PARTSWAP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig {
                reload_debounce_ms: 1500,
                store_timeout_secs: 15,
                event_channel_capacity: 64,
            },
            presence: PresenceConfig { heartbeat_interval_secs: 30 },
            telemetry: TelemetryConfig { log_format: LogFormat::Text },
        }
    }
}
