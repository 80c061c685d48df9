//! Speech model hosted in a persistent worker process.
//!
//! The worker speaks newline-delimited JSON over stdin/stdout. It announces
//! `{"status":"ready"}` once its model is loaded, answers each
//! `{"command":"transcribe","audio_path":...}` with one
//! `{"text":...,"confidence":...}` or `{"error":...}` line, and exits on
//! `{"command":"shutdown"}`. Stdout lines that are not JSON, and status lines
//! carrying neither text nor error, are treated as worker chatter and skipped.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::engine::types::{EngineLoader, SpeechModel, Transcript};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum WorkerCommand<'a> {
    Transcribe { audio_path: &'a Path },
    Shutdown,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerReply {
    status: Option<String>,
    text: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
}

/// Spawns a worker process per load.
#[derive(Debug, Clone)]
pub struct WorkerLoader {
    command: String,
    args: Vec<String>,
    model_name: String,
    ready_timeout: Duration,
}

impl WorkerLoader {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        model_name: impl Into<String>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            model_name: model_name.into(),
            ready_timeout,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            config.name.clone(),
            Duration::from_secs(config.ready_timeout_secs),
        )
    }
}

impl EngineLoader for WorkerLoader {
    fn load(&self) -> Result<Box<dyn SpeechModel>> {
        debug!(
            "Spawning worker: {} {} --model {}",
            self.command,
            self.args.join(" "),
            self.model_name
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg("--model")
            .arg(&self.model_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::EngineLoad(format!("failed to start worker '{}': {}", self.command, e))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                reap(&mut child);
                return Err(Error::EngineLoad("worker pipes unavailable".to_string()));
            }
        };

        let (line_tx, lines) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("stt-worker-stdout".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(err) = reader {
            reap(&mut child);
            return Err(Error::EngineLoad(format!("failed to start worker reader: {err}")));
        }

        let mut engine = WorkerEngine {
            child,
            stdin,
            lines,
            closed: false,
        };
        engine.wait_ready(self.ready_timeout)?;

        info!("Worker ready with model {}", self.model_name);
        Ok(Box::new(engine))
    }

    fn describe(&self) -> String {
        format!("model {}", self.model_name)
    }
}

/// A running worker process.
pub struct WorkerEngine {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    closed: bool,
}

impl WorkerEngine {
    fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match self.lines.recv_timeout(remaining) {
                Ok(Ok(line)) => line,
                Ok(Err(err)) => {
                    return Err(Error::EngineLoad(format!("failed to read from worker: {err}")))
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::EngineLoad(format!(
                        "worker did not become ready within {}s",
                        timeout.as_secs()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::EngineLoad(self.exit_reason()));
                }
            };

            let Some(reply) = parse_reply(&line) else {
                continue;
            };
            if let Some(error) = reply.error {
                return Err(Error::EngineLoad(error));
            }
            if reply.status.as_deref() == Some("ready") {
                return Ok(());
            }
        }
    }

    fn send(&mut self, command: &WorkerCommand<'_>) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(command)?;
        line.push(b'\n');
        self.stdin.write_all(&line)?;
        self.stdin.flush()
    }

    fn exit_reason(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => format!("worker exited unexpectedly ({status})"),
            _ => "worker closed its output".to_string(),
        }
    }
}

impl SpeechModel for WorkerEngine {
    fn transcribe(&mut self, audio_path: &Path) -> Result<Transcript> {
        if let Err(e) = self.send(&WorkerCommand::Transcribe { audio_path }) {
            self.closed = true;
            return Err(Error::Inference(format!("failed to send to worker: {e}")));
        }

        loop {
            let line = match self.lines.recv() {
                Ok(Ok(line)) => line,
                Ok(Err(err)) => {
                    self.closed = true;
                    return Err(Error::Inference(format!("failed to read from worker: {err}")));
                }
                Err(_) => {
                    self.closed = true;
                    return Err(Error::Inference(self.exit_reason()));
                }
            };

            let Some(reply) = parse_reply(&line) else {
                continue;
            };
            if let Some(error) = reply.error {
                return Err(Error::Inference(error));
            }
            match reply.text {
                Some(text) => return Ok(Transcript::new(text, reply.confidence)),
                None => debug!("worker status: {}", reply.status.as_deref().unwrap_or("-")),
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("Worker exited ({})", status);
                self.closed = true;
                false
            }
            Err(err) => {
                warn!("Failed to poll worker: {}", err);
                self.closed = true;
                false
            }
        }
    }
}

impl Drop for WorkerEngine {
    fn drop(&mut self) {
        if let Err(err) = self.send(&WorkerCommand::Shutdown) {
            debug!("Failed to send shutdown to worker: {}", err);
        }
        reap(&mut self.child);
        info!("Worker stopped");
    }
}

fn parse_reply(line: &str) -> Option<WorkerReply> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(reply) => Some(reply),
        Err(_) => {
            debug!("worker: {}", trimmed);
            None
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        if err.kind() != std::io::ErrorKind::InvalidInput {
            warn!("Failed to kill worker: {}", err);
        }
    }
    let _ = child.wait();
}
