//! Error types for the STT broker

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Broker error types
///
/// The first five variants are per-request failures. Everything except
/// `Decode` is reported back to the requester as an error response whose
/// `error_details` is this type's `Display` output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Request validation failed: {0}")]
    Validation(String),

    #[error("Audio validation failed: {0}")]
    AudioRejected(String),

    #[error("Model loading failed: {0}")]
    EngineLoad(String),

    #[error("Transcription failed: {0}")]
    Inference(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the requester should receive an error response for this failure.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::AudioRejected(_)
                | Error::EngineLoad(_)
                | Error::Inference(_)
        )
    }

    /// The underlying cause without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Decode(msg)
            | Error::Encode(msg)
            | Error::Validation(msg)
            | Error::AudioRejected(msg)
            | Error::EngineLoad(msg)
            | Error::Inference(msg)
            | Error::Transport(msg)
            | Error::Config(msg) => msg.clone(),
            Error::Io(err) => err.to_string(),
        }
    }
}

impl From<zmq::Error> for Error {
    fn from(err: zmq::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Encode(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
