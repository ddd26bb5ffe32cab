use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    // Connection errors
    ConnectionClosed,
    SendTimeout(String),

    // Message errors
    MessageParseError(String),

    // Queue errors
    QueueError(String),

    // System errors
    SystemError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::SendTimeout(id) => write!(f, "Send to connection {} timed out", id),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::QueueError(msg) => write!(f, "Queue error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::QueueError(format!("HTTP request failed: {}", err))
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::ConfigError(format!("Invalid URL: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MessageParseError(err.to_string())
    }
}

impl From<gcp_auth::Error> for RelayError {
    fn from(err: gcp_auth::Error) -> Self {
        RelayError::QueueError(format!("Failed to obtain access token: {}", err))
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;
