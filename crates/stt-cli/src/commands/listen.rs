use std::io::Write;
use std::time::Duration;

use console::style;
use stt_core::{SttClient, TranscriptionResponse};

use crate::error::Result;
use crate::style::Theme;

pub async fn execute(bind: String, poll_ms: u64, theme: &Theme) -> Result<()> {
    let mut client = SttClient::new(bind.clone());
    client.connect()?;

    theme.info(&format!("Listening for transcriptions on {}", style(&bind).cyan()));
    println!("Press Ctrl+C to stop.\n");

    let stop = client.stop_handle();
    tokio::spawn(async move {
        super::shutdown_signal().await;
        stop.stop();
    });

    let printer = theme.clone();
    let result = tokio::task::spawn_blocking(move || {
        let outcome = client.listen(
            |response| print_response(&response, &printer),
            Duration::from_millis(poll_ms),
        );
        client.disconnect();
        outcome
    })
    .await?;
    result?;

    theme.success("Listener stopped");
    Ok(())
}

fn print_response(response: &TranscriptionResponse, theme: &Theme) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    let timing = format!("{:.1} ms", response.processing_time_ms());

    if response.is_success() {
        let confidence = response
            .confidence()
            .map(|c| format!(", confidence {:.2}", c))
            .unwrap_or_default();
        writeln!(
            out,
            "{} {} {}",
            (theme.success)("✓"),
            (theme.accent)(response.request_id()),
            (theme.muted)(&format!("({}{})", timing, confidence))
        )?;
        writeln!(out, "  {}", response.text())?;
    } else {
        writeln!(
            out,
            "{} {} {}",
            (theme.error)("✗"),
            (theme.accent)(response.request_id()),
            (theme.muted)(&format!("({})", timing))
        )?;
        writeln!(out, "  {}", response.error_details().unwrap_or_default())?;
    }
    out.flush()
}
