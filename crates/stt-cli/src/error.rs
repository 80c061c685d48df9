use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    /// Broker failure (transport, config, engine)
    Broker(stt_core::Error),
    /// Invalid input
    InvalidInput(String),
    /// I/O error
    Io(io::Error),
    /// Other errors
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Broker(e) => write!(f, "{}", e),
            CliError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            CliError::Io(e) => {
                write!(f, "I/O error: {}", e)
            }
            CliError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<stt_core::Error> for CliError {
    fn from(e: stt_core::Error) -> Self {
        CliError::Broker(e)
    }
}

impl From<tokio::task::JoinError> for CliError {
    fn from(e: tokio::task::JoinError) -> Self {
        CliError::Other(format!("Background task failed: {}", e))
    }
}
