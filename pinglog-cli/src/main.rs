mod cli;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pinglog_sink::{Config, LogSink, PingLogger, S3Uploader};
use tracing::{error, info, warn};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match logging::init_logging(args.verbose, args.quiet, args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::InitConfig { path, force } => init_config(&path, force),
        Commands::UploadNow { config, files } => upload_now(&config, files).await,
        Commands::Serve {
            config,
            files,
            upload_existing,
        } => serve(&config, files, upload_existing).await,
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    Config::write_default(path).context("writing template config")?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Explicit files win; otherwise the settings file names them.
fn resolve_files(config: &Config, files: Vec<PathBuf>) -> Vec<PathBuf> {
    if files.is_empty() {
        config.log_files.clone()
    } else {
        files
    }
}

async fn upload_now(config_path: &Path, files: Vec<PathBuf>) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let files = resolve_files(&config, files);

    let sink = LogSink::open(&files, config.error_log_mode).context("opening log files")?;
    let uploader = S3Uploader::from_config(&config.s3).context("building S3 client")?;
    let mut logger = PingLogger::with_uploader(sink, Arc::new(uploader), None, false).await?;

    let result = logger.upload_now().await;
    if let Err(e) = logger.close().await {
        warn!(error = %e, "Failed to close log files");
    }
    result.context("upload failed")?;

    info!(files = files.len(), "Upload finished");
    Ok(())
}

async fn serve(config_path: &Path, files: Vec<PathBuf>, upload_existing: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let files = resolve_files(&config, files);

    let mut logger = PingLogger::from_config(&files, &config, upload_existing)
        .await
        .context("starting logger")?;

    if !logger.is_scheduled() {
        warn!("No upload schedule configured, files are kept locally");
    }
    info!(files = files.len(), "Serving, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!("Shutting down");
    logger.close().await.context("closing log files")?;
    Ok(())
}
