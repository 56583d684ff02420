use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default settings file, relative to the working directory.
pub const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "pinglog",
    version,
    about = "Per-target probe log files with scheduled object-store offload"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write diagnostics to a daily-rotated file in this directory
    #[arg(long, global = true, env = "PINGLOG_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a template settings file
    InitConfig {
        /// Where to write the template
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Upload every log file once and exit
    UploadNow {
        /// Settings file
        #[arg(short, long, default_value = DEFAULT_CONFIG, env = "PINGLOG_CONFIG")]
        config: PathBuf,

        /// Log files to upload; defaults to `log_files` from the settings
        files: Vec<PathBuf>,
    },

    /// Keep the upload schedule running until interrupted
    Serve {
        /// Settings file
        #[arg(short, long, default_value = DEFAULT_CONFIG, env = "PINGLOG_CONFIG")]
        config: PathBuf,

        /// Log files to manage; defaults to `log_files` from the settings
        files: Vec<PathBuf>,

        /// Upload files that already exist before the schedule starts
        #[arg(long)]
        upload_existing: bool,
    },
}
