use std::path::PathBuf;

use console::style;
use stt_core::{ConfigOverrides, SttConfig, SttService, WorkerLoader};
use tracing::info;

use crate::error::Result;
use crate::style::Theme;
use crate::utils::format_duration;

pub struct StartArgs {
    pub input_address: Option<String>,
    pub output_address: Option<String>,
    pub timeout: Option<u64>,
    pub convert_to_mono: bool,
    pub sample_rate: Option<u32>,
    pub model: Option<String>,
    pub worker_command: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl StartArgs {
    fn overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            input_address: self.input_address,
            output_address: self.output_address,
            expected_sample_rate: self.sample_rate,
            convert_to_mono: self.convert_to_mono.then_some(true),
            model_name: self.model,
            worker_command: self.worker_command,
            idle_timeout_minutes: self.timeout,
            log_file: self.log_file,
            log_level: self.log_level,
        }
    }
}

pub async fn execute(args: StartArgs, config_path: Option<PathBuf>, theme: &Theme) -> Result<()> {
    let mut config = SttConfig::load(config_path.as_deref())?;
    config.apply_overrides(args.overrides());
    config.validate()?;

    print_configuration(&config, theme);

    let _log_guard = crate::logging::init(&config.log_level, Some(&config.log_file))?;

    let loader = WorkerLoader::from_config(&config.model);
    let mut service = SttService::bind(&config, Box::new(loader))?;
    let shutdown = service.shutdown_signal();

    println!("\n{}", style("Service is running!").green().bold());
    println!("Press Ctrl+C to stop.\n");

    tokio::spawn(async move {
        super::shutdown_signal().await;
        shutdown.trigger();
    });

    let result = tokio::task::spawn_blocking(move || service.run()).await?;
    result?;

    info!("STT service exited cleanly");
    theme.success("Service stopped");
    Ok(())
}

fn print_configuration(config: &SttConfig, theme: &Theme) {
    theme.print_banner();

    println!("{}", style("Configuration:").bold().underlined());
    theme.setting("Input", &config.input_address);
    theme.setting("Output", &config.output_address);
    theme.setting("Model", &config.model.name);
    theme.setting(
        "Worker",
        format!("{} {}", config.model.command, config.model.args.join(" ")),
    );
    theme.setting("Idle timeout", format_duration(config.idle_timeout()));
    theme.setting("Sample rate", format!("{} Hz", config.expected_sample_rate));
    theme.setting(
        "Mono convert",
        if config.convert_to_mono {
            "enabled"
        } else {
            "disabled"
        },
    );
    theme.setting("Log file", config.log_file.display());
    theme.setting("Log level", &config.log_level);
}
