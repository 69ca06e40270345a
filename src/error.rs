use thiserror::Error;

/// Main error type for the prediction league
#[derive(Error, Debug)]
pub enum PaddockError {
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

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Calendar / outcome data errors
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid calendar data: {0}")]
    InvalidCalendarData(String),

    // Submission gating
    #[error("Predictions are locked: {0}")]
    Locked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PaddockError {
    /// Whether a watcher loop should back off and retry instead of giving up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PaddockError::Database(_)
                | PaddockError::Http(_)
                | PaddockError::DataUnavailable(_)
                | PaddockError::Io(_)
        )
    }
}

/// Result type alias for PaddockError
pub type Result<T> = std::result::Result<T, PaddockError>;
