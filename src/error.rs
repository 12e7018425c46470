use thiserror::Error;

/// Main error type for the sync layer.
///
/// Errors are stored inside published states (`QueryState`, `PollState`, ...),
/// so the enum is `Clone` and foreign errors are captured by message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Store readiness errors
    #[error("Document store not initialized yet")]
    NotReady,

    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Document store already initialized")]
    AlreadyInitialized,

    // Push channel errors
    #[error("Subscription to '{collection}' failed: {message}")]
    Subscription { collection: String, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // Pull channel errors
    #[error("HTTP request error: {0}")]
    Http(String),

    #[error("Analytics poll failed: {0}")]
    Poll(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(String),

    #[error("Failed to decode record {id}: {reason}")]
    Decode { id: String, reason: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Errors that may clear up on their own (readiness, network).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NotReady | SyncError::WebSocket(_) | SyncError::Http(_) | SyncError::Poll(_)
        )
    }

    pub fn subscription(collection: &str, message: impl Into<String>) -> Self {
        SyncError::Subscription {
            collection: collection.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Json(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}
