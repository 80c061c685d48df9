//! stt - command-line interface for the speech-to-text broker

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod error;
mod logging;
mod style;
mod utils;

use style::Theme;

/// Speech-to-text inference broker
///
/// Receives audio over ZeroMQ, transcribes it with a lazily loaded model and
/// forwards the results downstream.
///
/// Examples:
///   stt start                          # Run the broker with default settings
///   stt start --convert-to-mono        # Accept stereo input
///   stt listen --bind tcp://*:25000    # Print transcriptions as they arrive
///   stt send clip.wav                  # Submit one audio file
#[derive(Parser)]
#[command(
    name = "stt",
    about = "Speech-to-text inference broker",
    version = env!("CARGO_PKG_VERSION"),
    help_template = style::HELP_TEMPLATE,
    arg_required_else_help = true,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker service
    ///
    /// Binds the input endpoint, connects the output endpoint and serves
    /// requests until Ctrl+C or SIGTERM.
    #[command(name = "start", alias = "serve")]
    Start {
        /// Address the input ROUTER socket binds to
        #[arg(long, value_name = "ADDR", env = "STT_INPUT_ADDRESS")]
        input_address: Option<String>,

        /// Address the output DEALER socket connects to
        #[arg(long, value_name = "ADDR", env = "LLM_RAG_PIPE_INPUT_ADDRESS")]
        output_address: Option<String>,

        /// Minutes of inactivity before the model is unloaded
        #[arg(long, value_name = "MINUTES")]
        timeout: Option<u64>,

        /// Downmix stereo input to mono instead of rejecting it
        #[arg(long)]
        convert_to_mono: bool,

        /// Sample rate every request must use
        #[arg(long, value_name = "HZ")]
        sample_rate: Option<u32>,

        /// Model the worker loads
        #[arg(short, long)]
        model: Option<String>,

        /// Executable that hosts the model worker
        #[arg(long, value_name = "CMD")]
        worker_command: Option<String>,

        /// Log file (rotated daily)
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long, value_name = "LEVEL")]
        log_level: Option<String>,
    },

    /// Print transcriptions sent downstream
    #[command(name = "listen")]
    Listen {
        /// Address to bind the ROUTER socket the broker connects to
        #[arg(
            long,
            value_name = "ADDR",
            default_value = "tcp://*:25000",
            env = "LLM_RAG_PIPE_INPUT_ADDRESS"
        )]
        bind: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll_ms: u64,
    },

    /// Send an audio file to the broker
    #[command(name = "send")]
    Send {
        /// WAV or FLAC file to transcribe
        file: PathBuf,

        /// Broker input address
        #[arg(
            long,
            value_name = "ADDR",
            default_value = "tcp://localhost:20499",
            env = "STT_INPUT_ADDRESS"
        )]
        address: String,

        /// Request id (defaults to file name plus timestamp)
        #[arg(long)]
        request_id: Option<String>,

        /// Audio format (inferred from the extension when omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Declared sample rate
        #[arg(long, default_value = "16000")]
        sample_rate: u32,
    },

    /// Show version information
    #[command(name = "version")]
    Version {
        /// Show build details
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();

    let theme = if no_color {
        Theme::no_color()
    } else {
        Theme::default()
    };

    if let Err(err) = run(cli, &theme).await {
        theme.error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, theme: &Theme) -> anyhow::Result<()> {
    match cli.command {
        Commands::Start {
            input_address,
            output_address,
            timeout,
            convert_to_mono,
            sample_rate,
            model,
            worker_command,
            log_file,
            log_level,
        } => {
            commands::start::execute(
                commands::start::StartArgs {
                    input_address,
                    output_address,
                    timeout,
                    convert_to_mono,
                    sample_rate,
                    model,
                    worker_command,
                    log_file,
                    log_level,
                },
                cli.config,
                theme,
            )
            .await
            .context("STT service failed")?;
        }

        Commands::Listen { bind, poll_ms } => {
            logging::init("info", None)?;
            commands::listen::execute(bind, poll_ms, theme)
                .await
                .context("listener failed")?;
        }

        Commands::Send {
            file,
            address,
            request_id,
            format,
            sample_rate,
        } => {
            logging::init("warn", None)?;
            commands::send::execute(
                commands::send::SendArgs {
                    file,
                    address,
                    request_id,
                    format,
                    sample_rate,
                },
                theme,
            )
            .context("failed to send audio")?;
        }

        Commands::Version { full } => {
            commands::version::execute(full, theme);
        }
    }

    Ok(())
}
