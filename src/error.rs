//! Error types for outreach-core.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox adapter errors (message source API).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Mailbox API request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed message payload: {0}")]
    MalformedPayload(String),
}

/// Mail pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("A polling run is already in progress")]
    AlreadyRunning,

    #[error("Message fetch failed: {0}")]
    Fetch(String),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Import pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Failed to parse file: {0}")]
    Parse(String),

    #[error("Invalid mapping configuration: {0}")]
    InvalidMapping(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Notification fan-out errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to create notification for {recipient}: {reason}")]
    InsertFailed { recipient: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
