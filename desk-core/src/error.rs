//! Error types for the desk

use thiserror::Error;

/// Desk-wide error type
#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Transport error ({connection}): {message}")]
    Transport { connection: String, message: String },

    #[error("Reconnect attempts exhausted for {connection} after {attempts} attempts")]
    ReconnectExhausted { connection: String, attempts: u32 },

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Price lookup error: {0}")]
    PriceLookup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    pub fn transport(connection: impl Into<String>, message: impl Into<String>) -> Self {
        DeskError::Transport {
            connection: connection.into(),
            message: message.into(),
        }
    }

    pub fn reconnect_exhausted(connection: impl Into<String>, attempts: u32) -> Self {
        DeskError::ReconnectExhausted {
            connection: connection.into(),
            attempts,
        }
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        DeskError::NotConnected(msg.into())
    }

    pub fn unknown_connection(msg: impl Into<String>) -> Self {
        DeskError::UnknownConnection(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        DeskError::Parse(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        DeskError::Store(msg.into())
    }

    pub fn price_lookup(msg: impl Into<String>) -> Self {
        DeskError::PriceLookup(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DeskError::Internal(msg.into())
    }
}

/// Result type alias for desk operations
pub type DeskResult<T> = Result<T, DeskError>;
