use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::coordinator::CoordinatorConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,ecologistix=debug,sqlx=warn";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which store backs the event and task queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    /// Process-local lists; nothing survives a restart
    Memory,
    /// `queue_items` table in PostgreSQL
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_backend")]
    pub backend: QueueBackendKind,
}

fn default_queue_backend() -> QueueBackendKind {
    QueueBackendKind::Postgres
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Write every Blackboard mutation through to `shipment_state`
    #[serde(default)]
    pub persist_shipments: bool,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            persist_shipments: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatusConfig {
    /// Status server port (disabled when unset)
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", DEFAULT_LOG_FILTER)?
            .set_default("logging.json", false)?
            .set_default("queue.backend", "postgres")?
            .set_default("coordinator.tick_ms", 1000)?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // e.g. config/production.toml
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ECOLOGISTIX_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // ECOLOGISTIX__DATABASE__URL, ECOLOGISTIX__COORDINATOR__TICK_MS, ...
            .add_source(
                Environment::with_prefix("ECOLOGISTIX")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// In-memory configuration for local runs and tests
    pub fn in_memory() -> Self {
        Self {
            queue: QueueConfig {
                backend: QueueBackendKind::Memory,
            },
            database: DatabaseConfig::default(),
            coordinator: CoordinatorConfig::default(),
            status: StatusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.coordinator.tick_ms == 0 {
            errors.push("coordinator.tick_ms must be positive".to_string());
        }

        let needs_database =
            self.queue.backend == QueueBackendKind::Postgres || self.database.persist_shipments;
        if needs_database && self.database.url.trim().is_empty() {
            errors.push("database.url is required for the postgres backend".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
