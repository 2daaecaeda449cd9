use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Per-event errors (contained within one event's processing)
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing field: {field}")]
    MissingField { field: String },

    #[error("Delegation to {queue} failed: {reason}")]
    DelegationFailure { queue: String, reason: String },

    // Transport errors
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    // Persistence errors
    #[error("Shipment store error: {0}")]
    Store(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CoordinatorError {
    pub fn missing_field(field: &str) -> Self {
        CoordinatorError::MissingField {
            field: field.to_string(),
        }
    }

    /// Errors that are contained within a single event's processing.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            CoordinatorError::MalformedPayload(_)
                | CoordinatorError::MissingField { .. }
                | CoordinatorError::DelegationFailure { .. }
        )
    }
}

/// Result type alias for CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;
