//! Audio admission: stage, decode, check policy, optionally downmix.
//!
//! Every exit path either hands exactly one [`StagedAudio`] to the caller or
//! leaves nothing behind on disk. The staged file is removed when the
//! artifact is dropped.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::audio::decode::{write_mono_wav, AudioDecoder, SymphoniaDecoder};
use crate::error::{Error, Result};
use crate::messaging::{AudioFormat, AudioRequest};

/// Admission policy knobs.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub expected_sample_rate: u32,
    pub convert_to_mono: bool,
    /// Where staged artifacts are written. `None` uses the system temp dir.
    pub staging_dir: Option<PathBuf>,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            expected_sample_rate: 16_000,
            convert_to_mono: false,
            staging_dir: None,
        }
    }
}

/// Validated audio on disk, ready for inference.
#[derive(Debug)]
pub struct StagedAudio {
    path: TempPath,
    format: AudioFormat,
    sample_rate: u32,
    channels: u16,
}

impl StagedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Delete the artifact now, reporting failures instead of swallowing them.
    pub fn close(self) -> Result<()> {
        let staged_path = self.path.display().to_string();
        self.path.close()?;
        debug!("Cleaned up staged audio: {}", staged_path);
        Ok(())
    }

    fn discard(self) {
        let staged_path = self.path.display().to_string();
        if let Err(err) = self.close() {
            warn!("Failed to clean up staged audio {}: {}", staged_path, err);
        }
    }
}

/// The admission pipeline.
pub struct AudioAdmission {
    policy: AdmissionPolicy,
    decoder: Box<dyn AudioDecoder>,
}

impl AudioAdmission {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self::with_decoder(policy, Box::new(SymphoniaDecoder))
    }

    pub fn with_decoder(policy: AdmissionPolicy, decoder: Box<dyn AudioDecoder>) -> Self {
        info!(
            "AudioAdmission initialized: sample_rate={}Hz, convert_to_mono={}",
            policy.expected_sample_rate, policy.convert_to_mono
        );
        Self { policy, decoder }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Admit a validated request, rejecting a declared rate that cannot match
    /// before anything is staged.
    pub fn admit_request(&self, request: &AudioRequest, format: AudioFormat) -> Result<StagedAudio> {
        let expected = i64::from(self.policy.expected_sample_rate);
        if request.sample_rate != expected {
            let reason = format!(
                "invalid sample rate: expected {} Hz, got {} Hz",
                expected, request.sample_rate
            );
            warn!("{} (declared by request {})", reason, request.request_id);
            return Err(Error::AudioRejected(reason));
        }

        self.admit(&request.audio_data, format)
    }

    /// Stage, decode and check raw audio bytes.
    pub fn admit(&self, bytes: &[u8], format: AudioFormat) -> Result<StagedAudio> {
        let staged = self.stage(bytes, format, "")?;

        let decoded = match self.decoder.read(bytes, format) {
            Ok(decoded) => decoded,
            Err(err) => {
                staged.discard();
                let reason = format!("failed to read audio: {}", err.detail());
                warn!("{}", reason);
                return Err(Error::AudioRejected(reason));
            }
        };

        if decoded.sample_rate != self.policy.expected_sample_rate {
            staged.discard();
            let reason = format!(
                "invalid sample rate: expected {} Hz, got {} Hz",
                self.policy.expected_sample_rate, decoded.sample_rate
            );
            warn!("{}", reason);
            return Err(Error::AudioRejected(reason));
        }

        match decoded.channels {
            1 => {
                debug!("Audio is mono, no conversion needed");
                Ok(StagedAudio {
                    sample_rate: decoded.sample_rate,
                    channels: 1,
                    ..staged
                })
            }
            2 if !self.policy.convert_to_mono => {
                staged.discard();
                let reason = "stereo audio but mono conversion disabled".to_string();
                warn!("{}", reason);
                Err(Error::AudioRejected(reason))
            }
            2 => {
                info!("Converting stereo audio to mono");
                let mono_samples = decoded.downmix_stereo();
                let mono = self.stage(&[], AudioFormat::Wav, "_mono")?;
                let written = write_mono_wav(mono.path(), &mono_samples, decoded.sample_rate);
                staged.discard();
                if let Err(err) = written {
                    mono.discard();
                    return Err(err);
                }

                debug!("Mono conversion complete: {}", mono.path().display());
                Ok(StagedAudio {
                    sample_rate: decoded.sample_rate,
                    channels: 1,
                    ..mono
                })
            }
            other => {
                staged.discard();
                let reason = format!("unsupported channel count: {other} (expected 1 or 2)");
                warn!("{}", reason);
                Err(Error::AudioRejected(reason))
            }
        }
    }

    fn stage(&self, bytes: &[u8], format: AudioFormat, tag: &str) -> Result<StagedAudio> {
        let suffix = format!("{tag}.{}", format.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("stt-").suffix(&suffix);

        let mut file = match &self.policy.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| Error::AudioRejected(format!("failed to stage audio: {e}")))?;

        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| Error::AudioRejected(format!("failed to stage audio: {e}")))?;

        Ok(StagedAudio {
            path: file.into_temp_path(),
            format,
            sample_rate: 0,
            channels: 0,
        })
    }
}
