use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use console::style;
use stt_core::{AudioRequest, RequestSender};

use crate::error::{CliError, Result};
use crate::style::Theme;
use crate::utils::{format_bytes, resolve_format};

pub struct SendArgs {
    pub file: PathBuf,
    pub address: String,
    pub request_id: Option<String>,
    pub format: Option<String>,
    pub sample_rate: u32,
}

pub fn execute(args: SendArgs, theme: &Theme) -> Result<()> {
    if !args.file.exists() {
        return Err(CliError::InvalidInput(format!(
            "file not found: {}",
            args.file.display()
        )));
    }

    let format = resolve_format(&args.file, args.format.as_deref())?;
    let audio = std::fs::read(&args.file)?;
    let request_id = args
        .request_id
        .unwrap_or_else(|| default_request_id(&args.file));

    let size = format_bytes(audio.len() as u64);
    let request = AudioRequest::new(request_id.clone(), format, args.sample_rate, audio);
    request
        .validate()
        .map_err(|e| CliError::InvalidInput(e.detail()))?;

    let sender = RequestSender::connect(&args.address)?;
    sender.send(&request)?;

    theme.success(&format!(
        "Sent {} ({}, {}, {} Hz) to {}",
        style(&request_id).cyan(),
        format,
        size,
        args.sample_rate,
        args.address
    ));
    Ok(())
}

fn default_request_id(file: &std::path::Path) -> String {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}-{}", stem, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_id_uses_file_stem() {
        let id = default_request_id(std::path::Path::new("/data/meeting.wav"));
        assert!(id.starts_with("meeting-"));
    }

    #[test]
    fn missing_file_is_rejected_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let args = SendArgs {
            file: dir.path().join("absent.wav"),
            address: "tcp://localhost:1".to_string(),
            request_id: None,
            format: None,
            sample_rate: 16_000,
        };
        let err = execute(args, &Theme::no_color()).unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
    }
}
