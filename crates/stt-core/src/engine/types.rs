use std::path::Path;

use crate::error::Result;

/// Normalized transcription result.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f64>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A materialized speech model. Dropping it releases its resources.
pub trait SpeechModel: Send {
    fn transcribe(&mut self, audio_path: &Path) -> Result<Transcript>;

    /// Whether the model can still serve requests. A dead model is dropped
    /// and loaded again on the next acquire.
    fn is_alive(&mut self) -> bool {
        true
    }
}

/// Materializes a [`SpeechModel`]. Loading may take minutes.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn SpeechModel>>;

    /// Short label used in logs.
    fn describe(&self) -> String {
        "speech model".to_string()
    }
}
