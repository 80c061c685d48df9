//! Request and response schemas

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Audio container formats accepted by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 2] = [AudioFormat::Wav, AudioFormat::Flac];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
        }
    }

    /// File extension used when staging audio of this format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wav" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(Error::Validation(format!(
                "Invalid audio format: {other}. Must be 'wav' or 'flac'"
            ))),
        }
    }
}

/// One inference ask, as decoded from the wire.
///
/// `audio_format` and `sample_rate` keep their raw wire types so that a
/// request with an unsupported format or a non-positive rate still decodes
/// and can be answered with a validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRequest {
    pub request_id: String,
    pub audio_format: String,
    pub sample_rate: i64,
    #[serde(with = "serde_bytes")]
    pub audio_data: Vec<u8>,
}

impl AudioRequest {
    pub fn new(
        request_id: impl Into<String>,
        audio_format: AudioFormat,
        sample_rate: u32,
        audio_data: Vec<u8>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            audio_format: audio_format.as_str().to_string(),
            sample_rate: i64::from(sample_rate),
            audio_data,
        }
    }

    /// Check the well-formedness invariant and return the parsed format.
    ///
    /// Checks run in a fixed order and the first violation wins.
    pub fn validate(&self) -> Result<AudioFormat> {
        if self.request_id.is_empty() {
            return Err(Error::Validation("request_id cannot be empty".to_string()));
        }

        let format = self.audio_format.parse::<AudioFormat>()?;

        if self.sample_rate <= 0 {
            return Err(Error::Validation(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }

        if self.audio_data.is_empty() {
            return Err(Error::Validation("audio_data cannot be empty".to_string()));
        }

        Ok(format)
    }
}

/// Outcome of a transcription attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Success => f.write_str("success"),
            ResponseStatus::Error => f.write_str("error"),
        }
    }
}

/// One inference outcome.
///
/// Only constructible through [`TranscriptionResponse::success`] and
/// [`TranscriptionResponse::error`]; decoding goes through the same
/// consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResponseFrame")]
pub struct TranscriptionResponse {
    request_id: String,
    status: ResponseStatus,
    text: String,
    confidence: Option<f64>,
    processing_time_ms: f64,
    error_details: Option<String>,
}

impl TranscriptionResponse {
    pub fn success(
        request_id: impl Into<String>,
        text: impl Into<String>,
        confidence: Option<f64>,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Success,
            text: text.into(),
            confidence,
            processing_time_ms,
            error_details: None,
        }
    }

    pub fn error(
        request_id: impl Into<String>,
        error_details: impl Into<String>,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Error,
            text: String::new(),
            confidence: None,
            processing_time_ms,
            error_details: Some(error_details.into()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time_ms
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }
}

/// Unchecked wire shape of a response.
#[derive(Deserialize)]
struct ResponseFrame {
    request_id: String,
    status: ResponseStatus,
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    processing_time_ms: f64,
    #[serde(default)]
    error_details: Option<String>,
}

impl TryFrom<ResponseFrame> for TranscriptionResponse {
    type Error = String;

    fn try_from(frame: ResponseFrame) -> std::result::Result<Self, Self::Error> {
        match (frame.status, frame.error_details) {
            (ResponseStatus::Success, None) => Ok(Self::success(
                frame.request_id,
                frame.text,
                frame.confidence,
                frame.processing_time_ms,
            )),
            (ResponseStatus::Error, Some(details)) => Ok(Self::error(
                frame.request_id,
                details,
                frame.processing_time_ms,
            )),
            (ResponseStatus::Success, Some(_)) => {
                Err("success response must not carry error_details".to_string())
            }
            (ResponseStatus::Error, None) => {
                Err("error response is missing error_details".to_string())
            }
        }
    }
}
