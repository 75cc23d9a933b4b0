//! Error types for Mailward

use thiserror::Error;

/// Main error type for Mailward
///
/// Infrastructure failures only. Policy decisions (reject/defer with an
/// SMTP code) are not errors; they travel as [`crate::types::Verdict`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("Policy service error: {0}")]
    Policy(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Mailward
pub type Result<T> = std::result::Result<T, Error>;
