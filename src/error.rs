//! Error types for the sniper bot

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Submission channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Event stream error: {0}")]
    Stream(String),

    // Protocol decoding
    #[error("Decode error: {0}")]
    Decode(String),

    // Filtering
    #[error("Filter check timed out, last failing filter: {filter}")]
    FilterTimeout { filter: String },

    #[error("Token rejected by {filter}: {reason}")]
    FilterRejected { filter: String, reason: String },

    // Trading errors
    #[error("Instruction build failed: {0}")]
    InstructionBuild(String),

    #[error("Transaction submit failed: {0}")]
    Submit(String),

    #[error("Transaction {signature} not confirmed within {timeout_ms}ms")]
    ConfirmTimeout { signature: String, timeout_ms: u64 },

    #[error("Transaction {signature} rejected: {reason}")]
    TransactionRejected { signature: String, reason: String },

    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },

    // Position lifecycle
    #[error("Invalid position transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::ChannelUnavailable(_)
                | Error::Submit(_)
                | Error::ConfirmTimeout { .. }
                | Error::TransactionRejected { .. }
        )
    }

    /// Check if this error ends a position without further attempts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. } | Error::InstructionBuild(_) | Error::Decode(_)
        )
    }
}

// Conversion from solana_client errors. Transport failures mean the channel
// itself is down, everything else is a plain RPC failure.
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        use solana_client::client_error::ClientErrorKind;

        match e.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
                Error::ChannelUnavailable(e.to_string())
            }
            _ => Error::Rpc(e.to_string()),
        }
    }
}

impl From<solana_client::nonblocking::pubsub_client::PubsubClientError> for Error {
    fn from(e: solana_client::nonblocking::pubsub_client::PubsubClientError) -> Self {
        Error::Stream(e.to_string())
    }
}

// Relay HTTP errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::ChannelUnavailable(e.to_string())
        } else {
            Error::Submit(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
