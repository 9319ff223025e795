mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::autosort::AutosortArgs;
use cli::compare::CompareArgs;
use cli::AppContext;
use smartscan::config::SmartScanConfig;
use smartscan::history::parse_date;

#[derive(Parser)]
#[command(
    name = "smartscan",
    version,
    about = "Sort files into directories by content similarity"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare a file with another file, a directory, or several directories
    Compare {
        /// File to compare
        file: PathBuf,
        /// File or directory to compare against
        target: Option<PathBuf>,
        /// Directories to compare against
        #[arg(long, num_args = 1..)]
        dirs: Vec<PathBuf>,
        /// File listing directories to compare against, one per line
        #[arg(long)]
        dirlist_file: Option<PathBuf>,
        /// Frames sampled per video
        #[arg(long)]
        n_frames: Option<usize>,
        /// Delete cached prototypes in these directories first
        #[arg(long, num_args = 1..)]
        clear_dir_prototypes: Vec<PathBuf>,
    },
    /// Classify files in target directories and move them into the best-matching destination
    #[command(alias = "scan")]
    Autosort {
        /// File listing target directories, one per line
        dirlist_file: Option<PathBuf>,
        /// Target directories
        #[arg(long, num_args = 1..)]
        dirs: Vec<PathBuf>,
        /// Destination directories (default: subdirectories of the targets)
        #[arg(long, num_args = 1..)]
        destinations: Vec<PathBuf>,
        /// Minimum similarity required to move a file
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Frames sampled per video
        #[arg(long)]
        n_frames: Option<usize>,
        /// Classify only; do not move anything
        #[arg(long)]
        dry_run: bool,
        /// Delete cached prototypes in these directories first
        #[arg(long, num_args = 1..)]
        clear_dir_prototypes: Vec<PathBuf>,
    },
    /// Embed files into the vector store
    Index {
        /// File listing directories to index, one per line
        dirlist_file: Option<PathBuf>,
        /// Directories to index
        #[arg(long, num_args = 1..)]
        dirs: Vec<PathBuf>,
        /// Frames sampled per video
        #[arg(long)]
        n_frames: Option<usize>,
    },
    /// Move sorted files back to their original location
    Restore {
        /// File to restore
        file: Option<PathBuf>,
        /// Files to restore
        #[arg(long, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Restore every file moved on or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start_date: Option<String>,
        /// Restore every file moved on or before this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Inspect or clear the scan history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage the embedding models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List logged moves, newest first
    List {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all history
    Clear,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the configured models to ~/.smartscan/models/
    Download,
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = start
        .map(|s| parse_date(s, false).with_context(|| format!("invalid start date: {s}")))
        .transpose()?;
    let end = end
        .map(|s| parse_date(s, true).with_context(|| format!("invalid end date: {s}")))
        .transpose()?;
    Ok((start, end))
}

/// Cancellation token that fires on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted: finishing the current batch...");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SmartScanConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compare {
            file,
            target,
            dirs,
            dirlist_file,
            n_frames,
            clear_dir_prototypes,
        } => {
            if let Some(n) = n_frames {
                config.organiser.n_frames = n;
            }
            let dirs = cli::collect_dirs(&dirs, dirlist_file.as_ref())?;
            let ctx = AppContext::load_async(config).await?;
            cli::compare::compare(
                ctx.clone(),
                CompareArgs {
                    file,
                    target,
                    dirs,
                    clear_dir_prototypes,
                },
            )
            .await?;
            ctx.close();
        }
        Command::Autosort {
            dirlist_file,
            dirs,
            destinations,
            threshold,
            n_frames,
            dry_run,
            clear_dir_prototypes,
        } => {
            if let Some(n) = n_frames {
                config.organiser.n_frames = n;
            }
            let mut target_dirs = cli::collect_dirs(&dirs, dirlist_file.as_ref())?;
            if target_dirs.is_empty() {
                let configured: Vec<PathBuf> = config
                    .organiser
                    .target_dirs
                    .iter()
                    .map(|d| smartscan::config::expand_tilde(d))
                    .collect();
                target_dirs = cli::collect_dirs(&configured, None)?;
            }
            let threshold = threshold.unwrap_or(config.organiser.similarity_threshold);
            let ctx = AppContext::load_async(config).await?;
            cli::autosort::autosort(
                ctx.clone(),
                AutosortArgs {
                    target_dirs,
                    destinations,
                    threshold,
                    dry_run,
                    clear_dir_prototypes,
                },
                ctrl_c_token(),
            )
            .await?;
            ctx.close();
        }
        Command::Index {
            dirlist_file,
            dirs,
            n_frames,
        } => {
            if let Some(n) = n_frames {
                config.organiser.n_frames = n;
            }
            let dirs = cli::collect_dirs(&dirs, dirlist_file.as_ref())?;
            let ctx = AppContext::load_async(config).await?;
            cli::index::index(ctx.clone(), dirs, ctrl_c_token()).await?;
            ctx.close();
        }
        Command::Restore {
            file,
            mut files,
            start_date,
            end_date,
        } => {
            let (start, end) = parse_range(start_date.as_deref(), end_date.as_deref())?;
            files.extend(file);
            cli::restore::restore(&config, files, start, end).await?;
        }
        Command::History { action } => match action {
            HistoryAction::List {
                limit,
                start_date,
                end_date,
                json,
            } => {
                let (start, end) = parse_range(start_date.as_deref(), end_date.as_deref())?;
                cli::history::list(&config, limit, start, end, json)?;
            }
            HistoryAction::Clear => cli::history::clear(&config)?,
        },
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model::model_download(&config.models).await?;
            }
        },
    }

    Ok(())
}
