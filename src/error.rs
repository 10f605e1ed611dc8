//! Error types for imap-script-harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The connection to the server under test could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read or write failed in the middle of a session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The external server process or container failed to start or stop.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The calling test used the harness out of order.
    #[error("Programming error: {0}")]
    Programming(String),

    /// A test ran longer than the harness allows.
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
