use thiserror::Error;

/// Failures that can reach the cache and pagination layers.
///
/// Transport errors are converted into one of these before they leave the
/// API client, so nothing above it ever sees a raw ureq error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response at all: connection failure or the request ceiling elapsed.
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered with a non-2xx status, or a 2xx without `data`.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A timestamp, timezone or body could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A single-item lookup found nothing.
    #[error("not found: {what}")]
    NotFound { what: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network { message: message.into() }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        ApiError::Server { status, message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ApiError::Parse { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound { what: what.into() }
    }

    /// Human readable message, as shown next to a retry affordance.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message } | ApiError::Server { message, .. } | ApiError::Parse { message } => message,
            ApiError::NotFound { what } => what,
        }
    }

    /// HTTP status when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
