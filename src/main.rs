//! vidsub - staged video subtitling pipeline
//!
//! Command line entry point: loads configuration, installs logging and
//! drives the workflow.

use anyhow::Result;
use clap::Parser;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vidsub::cli::{Args, Commands};
use vidsub::config::{Config, LoggingConfig};
use vidsub::error::VidsubError;
use vidsub::media::MediaProcessorFactory;
use vidsub::stage::RunRequest;
use vidsub::translate::check_ollama_availability;
use vidsub::workflow::{CancelFlag, Workflow};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<VidsubError>()
                .map(VidsubError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if let Commands::InitConfig { output, force } = &args.command {
        return init_config(output, *force);
    }

    let config = load_config(args.config.as_deref())?;
    config.validate()?;
    setup_logging(args.verbose, &config.paths.logs_dir, &config.logging)?;

    match args.command {
        Commands::Run { video, mode, steps } => {
            let mode = mode.unwrap_or(config.subtitles.mode);
            let workflow = Workflow::from_config(Arc::new(config))?;

            let cancel = workflow.cancel_flag();
            tokio::spawn(async move {
                if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
                    std::process::exit(130);
                }
            });

            let mut request = RunRequest::full(mode).with_stages(steps);
            request.video = video;

            info!("Starting vidsub run ({} subtitles)", mode);
            let report = workflow.run(request).await?;

            println!("Video: {}", report.video.display());
            for stage in &report.executed {
                println!("  ran      {}", stage);
            }
            for stage in &report.skipped {
                println!("  skipped  {}", stage);
            }
        }

        Commands::Status { video, mode } => {
            let mode = mode.unwrap_or(config.subtitles.mode);
            let workflow = Workflow::from_config(Arc::new(config))?;
            let (video, artifacts) = workflow.describe(video.as_deref(), mode)?;

            println!("Video: {}", video.display());
            for artifact in artifacts {
                let marker = if artifact.exists { "done" } else { "missing" };
                println!("  {:<11} [{}]", artifact.stage.to_string(), marker);
                for path in &artifact.expected {
                    println!("      {}", path.display());
                }
            }
        }

        Commands::Check => {
            let media = MediaProcessorFactory::create_processor(config.media.clone(), config.style.clone());
            media.check_availability().await?;
            check_ollama_availability(&config.translation.endpoint, &config.translation.model).await?;
            println!("ffmpeg and {} are available", config.translation.model);
        }

        Commands::InitConfig { .. } => unreachable!("handled before configuration is loaded"),
    }

    Ok(())
}

/// The first interrupt asks the run to stop before its next stage. Returns
/// true on a second interrupt, when the caller should exit at once.
async fn watch_interrupts<S, Fut>(mut interrupt: S, cancel: CancelFlag) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!("Unable to listen for interrupts: {}", e);
        return false;
    }
    warn!("Interrupt received, stopping before the next stage (press Ctrl-C again to exit now)");
    cancel.cancel();

    if interrupt().await.is_err() {
        return false;
    }
    warn!("Second interrupt received, exiting");
    true
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if Path::new("config.toml").exists() {
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(VidsubError::Config(format!(
            "{} already exists, pass --force to overwrite",
            output.display()
        ))
        .into());
    }
    Config::default().save_to_file(output)?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

fn setup_logging(verbose: bool, log_dir: &Path, logging: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(&logging.file_name);
    rotate_if_oversized(&log_path, logging.max_file_size_mb * 1024 * 1024, logging.backups)?;

    // Size-based rotation happens above, so the appender never rolls by time
    let file_appender = rolling::never(log_dir, &logging.file_name);
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow::anyhow!("Invalid log level {}: {}", default_level, e))?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - level: {}, file: {}", default_level, log_path.display());
    Ok(())
}

/// Shift `file` to `file.1`, `file.1` to `file.2` and so on once it exceeds
/// `max_bytes`, keeping at most `backups` old files.
fn rotate_if_oversized(file: &Path, max_bytes: u64, backups: u32) -> Result<()> {
    let size = match std::fs::metadata(file) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if size <= max_bytes {
        return Ok(());
    }

    let backup = |n: u32| PathBuf::from(format!("{}.{}", file.display(), n));
    if backups == 0 {
        std::fs::remove_file(file)?;
        return Ok(());
    }

    let oldest = backup(backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            std::fs::rename(&from, backup(n + 1))?;
        }
    }
    std::fs::rename(file, backup(1))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let cancel = CancelFlag::new();
        let mut received = 0;
        let forced = watch_interrupts(
            || {
                received += 1;
                async { Ok(()) }
            },
            cancel.clone(),
        )
        .await;

        assert!(forced);
        assert!(cancel.is_cancelled());
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_interrupt_listener_failure_does_not_exit() {
        let cancel = CancelFlag::new();
        let forced = watch_interrupts(
            || async { Err(std::io::Error::other("no signal handler")) },
            cancel.clone(),
        )
        .await;

        assert!(!forced);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_rotate_if_oversized_shifts_backups() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("pipeline.log");
        std::fs::write(&log, "current").unwrap();
        std::fs::write(dir.path().join("pipeline.log.1"), "older").unwrap();

        rotate_if_oversized(&log, 3, 2).unwrap();

        assert!(!log.exists());
        let first = std::fs::read_to_string(dir.path().join("pipeline.log.1")).unwrap();
        let second = std::fs::read_to_string(dir.path().join("pipeline.log.2")).unwrap();
        assert_eq!((first.as_str(), second.as_str()), ("current", "older"));
    }
}
