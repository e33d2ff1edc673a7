//! Reelcast CLI: command-line interface for recording short videos.
//!
//! Usage:
//!   reelcast run [OPTIONS]         Record one job end to end
//!   reelcast budget [OPTIONS]      Show the duration budget for a job
//!   reelcast locate                Find the most recent recording
//!   reelcast cleanup [OPTIONS]     Stop helper servers and remove temp files
//!   reelcast status                Show the remote recorder's state
//!   reelcast check                 Check the environment
//!   reelcast config [OPTIONS]      Show or write the configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use reelcast_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelcast",
    about = "Record paced short videos from html content",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one job: view, capture, locate, post-process, clean up
    Run {
        /// Job request as JSON ({jobId, contentSourcePath, title, ...})
        #[arg(long, conflicts_with_all = ["content", "title", "intro_title", "music_style", "duration"])]
        request: Option<PathBuf>,

        /// Job id (defaults to a timestamp)
        #[arg(long)]
        job_id: Option<String>,

        /// Content source file
        #[arg(short, long, required_unless_present = "request")]
        content: Option<PathBuf>,

        /// Title shown in the view
        #[arg(short, long, required_unless_present = "request")]
        title: Option<String>,

        /// Intro title (defaults to the title)
        #[arg(long)]
        intro_title: Option<String>,

        /// Background music style
        #[arg(long)]
        music_style: Option<String>,

        /// Target duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u32,

        /// Write the job outcome as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the duration budget for a content file
    Budget {
        /// Content source file
        content: PathBuf,

        /// Target duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find the most recent recording the way the pipeline would
    Locate {
        /// Override the recency window (seconds)
        #[arg(long)]
        window: Option<u64>,
    },

    /// Stop helper servers, close the view window, remove a job's temp files
    Cleanup {
        /// Job whose temp files should be removed
        #[arg(long)]
        job_id: Option<String>,

        /// View window process id
        #[arg(long)]
        pid: Option<u32>,

        /// Close windows whose title starts with this
        #[arg(long)]
        window_title: Option<String>,
    },

    /// Show whether the remote recorder is recording
    Status,

    /// Check the environment
    Check,

    /// Show or write the configuration
    Config {
        /// Write the effective configuration to the standard location
        #[arg(long)]
        write: bool,

        /// Only print the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    reelcast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Run {
            request,
            job_id,
            content,
            title,
            intro_title,
            music_style,
            duration,
            report,
        } => {
            let request = match request {
                Some(path) => commands::run::read_request(&path, job_id)?,
                None => commands::run::build_request(
                    job_id,
                    content,
                    title,
                    intro_title,
                    music_style,
                    duration,
                )?,
            };
            commands::run::run(config, request, report).await
        }
        Commands::Budget {
            content,
            duration,
            json,
        } => commands::budget::run(&config, content, duration, json),
        Commands::Locate { window } => commands::locate::run(&config, window),
        Commands::Cleanup {
            job_id,
            pid,
            window_title,
        } => commands::cleanup::run(&config, job_id, pid, window_title).await,
        Commands::Status => commands::status::run(&config).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { write, path } => commands::config::run(&config, write, path),
    }
}

/// An explicit path must load; the standard location falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AppConfig::load()),
    }
}
