/// Error types for the chat core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl ChatError {
    /// Stable failure kind reported back over the wire in acks.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Io(_) => "io",
            ChatError::Serialization(_) => "serialization",
            ChatError::NotFound(_) => "not_found",
            ChatError::InvalidTarget(_) => "invalid_target",
            ChatError::Conflict(_) => "conflict",
            ChatError::Storage(_) => "storage",
            ChatError::Protocol(_) => "protocol",
            ChatError::Auth(_) => "auth",
            ChatError::Config(_) => "config",
            ChatError::Timeout(_) => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
