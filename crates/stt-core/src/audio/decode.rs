//! Audio decode capability used by the admission pipeline.

use std::io::Cursor;

use tracing::debug;

use crate::error::{Error, Result};
use crate::messaging::AudioFormat;

/// Decoded PCM audio, interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Average interleaved stereo frames into a single channel.
    pub fn downmix_stereo(&self) -> Vec<f32> {
        self.samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect()
    }
}

/// Turns raw container bytes into samples.
pub trait AudioDecoder: Send + Sync {
    fn read(&self, bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio>;
}

/// Decoder backed by symphonia, with a hound fallback for WAV variants
/// symphonia does not probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn read(&self, bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio> {
        if bytes.is_empty() {
            return Err(Error::AudioRejected("empty audio input".to_string()));
        }

        let decoded = match decode_symphonia(bytes, format) {
            Ok(decoded) => decoded,
            Err(symphonia_err) if format == AudioFormat::Wav => {
                decode_wav_hound(bytes).map_err(|wav_err| {
                    Error::AudioRejected(format!(
                        "{symphonia_err}; WAV fallback: {wav_err}"
                    ))
                })?
            }
            Err(err) => return Err(Error::AudioRejected(err)),
        };

        if decoded.sample_rate == 0 {
            return Err(Error::AudioRejected(
                "decoded audio has invalid sample rate 0".to_string(),
            ));
        }
        if decoded.samples.is_empty() {
            return Err(Error::AudioRejected(
                "decoded audio contains no samples".to_string(),
            ));
        }

        debug!(
            "Audio decoded: {} frames x {} channels @ {} Hz ({})",
            decoded.frames(),
            decoded.channels,
            decoded.sample_rate,
            format
        );

        Ok(decoded)
    }
}

fn decode_symphonia(bytes: &[u8], format: AudioFormat) -> std::result::Result<DecodedAudio, String> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;
    use symphonia::default::{get_codecs, get_probe};

    let media_source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = get_probe()
        .format(
            &hint,
            media_source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe failed: {e}"))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| "no default audio track found".to_string())?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("failed to create audio decoder: {e}"))?;

    let mut samples = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err("audio stream format reset is not supported".to_string());
            }
            Err(err) => return Err(format!("failed reading audio packets: {err}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => return Err(format!("failed decoding audio packet: {err}")),
        };

        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        if channels == 0 {
            channels = decoded.spec().channels.count() as u16;
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok(DecodedAudio {
        samples: sanitize(samples),
        sample_rate,
        channels: channels.max(1),
    })
}

fn decode_wav_hound(bytes: &[u8]) -> std::result::Result<DecodedAudio, String> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| format!("failed to parse WAV: {e}"))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample.max(1));
            let max_val = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| format!("failed to read WAV samples: {e}"))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| format!("failed to read WAV samples: {e}"))?,
    };

    Ok(DecodedAudio {
        samples: sanitize(samples),
        sample_rate: spec.sample_rate,
        channels: spec.channels.max(1),
    })
}

fn sanitize(mut samples: Vec<f32>) -> Vec<f32> {
    for sample in &mut samples {
        if !sample.is_finite() {
            *sample = 0.0;
        } else {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
    samples
}

/// Write mono samples as a 32-bit float WAV.
pub(crate) fn write_mono_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Error::AudioRejected(format!("failed to write mono audio: {e}")))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| Error::AudioRejected(format!("failed to write mono audio: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::AudioRejected(format!("failed to write mono audio: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, frames: &[&[f32]]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        {
            let cursor = Cursor::new(&mut bytes);
            let mut writer = hound::WavWriter::new(cursor, spec).expect("writer");
            for frame in frames {
                assert_eq!(frame.len(), usize::from(channels));
                for &sample in *frame {
                    writer
                        .write_sample((sample * 32767.0) as i16)
                        .expect("write sample");
                }
            }
            writer.finalize().expect("finalize");
        }
        bytes
    }

    #[test]
    fn mono_wav_keeps_rate_and_channels() {
        let bytes = wav_bytes(1, 16_000, &[&[0.5], &[-0.25], &[0.0]]);
        let decoded = SymphoniaDecoder.read(&bytes, AudioFormat::Wav).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), 3);
        assert!((decoded.samples[0] - 0.5).abs() < 0.01);
    }

    #[test]
    fn stereo_wav_is_reported_interleaved() {
        let bytes = wav_bytes(2, 16_000, &[&[0.25, 0.75], &[0.5, -0.5]]);
        let decoded = SymphoniaDecoder.read(&bytes, AudioFormat::Wav).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 2);

        let mono = decoded.downmix_stereo();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 0.01, "first sample {}", mono[0]);
        assert!(mono[1].abs() < 0.01, "second sample {}", mono[1]);
    }

    /// 512 frames of 16-bit mono at 16 kHz in two verbatim FLAC blocks.
    /// Sample `i` is `1000 + (i % 64) * 32`.
    const TONE_FLAC: &[u8] = include_bytes!("../../tests/fixtures/tone_16k_mono.flac");

    #[test]
    fn flac_is_decoded() {
        let decoded = SymphoniaDecoder.read(TONE_FLAC, AudioFormat::Flac).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), 512);

        for (i, sample) in decoded.samples.iter().enumerate().take(70) {
            let expected = (1000 + (i % 64) * 32) as f32 / 32768.0;
            assert!((sample - expected).abs() < 1e-4, "sample {i}: {sample}");
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let err = SymphoniaDecoder
            .read(b"definitely not audio", AudioFormat::Flac)
            .unwrap_err();
        assert!(matches!(err, Error::AudioRejected(_)));
    }
}
