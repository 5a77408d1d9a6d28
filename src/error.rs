//! Error types for claimflow.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Attachment error: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox gateway errors (IMAP fetch/flag side, SMTP send side).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Failed to update flags on message {message_id}: {reason}")]
    FlagFailed { message_id: String, reason: String },

    #[error("Failed to send email to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attachment materialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("Attachment {filename} declared as text but is not valid UTF-8")]
    Decode {
        filename: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Failed to rasterize {filename}: {reason}")]
    Rasterization { filename: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification errors from the model provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Network, auth, quota, or request-validation failure at the provider.
    #[error("Provider {provider} request failed: {reason}")]
    Provider { provider: String, reason: String },

    /// The provider answered, but not with exactly one well-formed
    /// structured result.
    #[error("Malformed provider response: {reason}")]
    MalformedResponse { reason: String },

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for claimflow.
pub type Result<T> = std::result::Result<T, Error>;
