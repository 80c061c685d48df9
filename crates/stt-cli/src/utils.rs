use std::path::Path;
use std::time::Duration;

use stt_core::AudioFormat;

use crate::error::{CliError, Result};

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Audio format from an explicit flag, falling back to the file extension.
pub fn resolve_format(path: &Path, explicit: Option<&str>) -> Result<AudioFormat> {
    if let Some(format) = explicit {
        return format
            .parse()
            .map_err(|e: stt_core::Error| CliError::InvalidInput(e.detail()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    AudioFormat::ALL
        .into_iter()
        .find(|format| format.extension() == extension)
        .ok_or_else(|| {
            CliError::InvalidInput(format!(
                "cannot infer audio format from '{}', pass --format wav|flac",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_humanized() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m 0s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(64 * 1024), "64.0 KB");
    }

    #[test]
    fn format_comes_from_flag_or_extension() {
        assert_eq!(
            resolve_format(Path::new("clip.FLAC"), None).unwrap(),
            AudioFormat::Flac
        );
        assert_eq!(
            resolve_format(Path::new("clip.bin"), Some("wav")).unwrap(),
            AudioFormat::Wav
        );
        assert!(resolve_format(Path::new("clip.mp3"), None).is_err());
        assert!(resolve_format(Path::new("clip.wav"), Some("mp3")).is_err());
    }
}
