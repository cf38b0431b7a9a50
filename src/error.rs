//! Error types for Svarog.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::types::Name;

/// Result type alias for Svarog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Svarog.
#[derive(Error, Debug)]
pub enum Error {
    // Probe errors
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    // Collaborator errors
    #[error("neighbor {0} not found")]
    NeighborNotFound(Name),

    #[error("signing failed: {0}")]
    Signing(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors raised while building, sending or answering link probes.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid probe name: {0}")]
    InvalidName(String),

    #[error("no route to neighbor {0}")]
    NoRoute(Name),

    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("no async runtime available to express probe")]
    NoRuntime,
}

impl Error {
    /// Check if error is transient (the next probe cycle may succeed).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Probe(
                ProbeError::SendFailed(_) | ProbeError::ReceiveFailed(_) | ProbeError::NoRoute(_)
            ) | Error::Io(_)
        )
    }
}
