//! CLI for the ADM asset download manager.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use adm_core::config;
use adm_core::store::KvStore;

use commands::{
    run_add, run_cancel, run_clear, run_pause, run_probe, run_remove, run_resume, run_scheduler,
    run_status,
};

/// Top-level CLI for the ADM download manager.
#[derive(Debug, Parser)]
#[command(name = "adm")]
#[command(about = "ADM: asset download manager with bounded concurrency", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a new download.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,

        /// Display title (defaults to the derived filename).
        #[arg(long)]
        title: Option<String>,

        /// Group key for related downloads (e.g. a series name).
        #[arg(long)]
        group: Option<String>,

        /// Destination directory (defaults to the configured download_dir,
        /// then the current directory).
        #[arg(long, value_name = "DIR")]
        dest_dir: Option<PathBuf>,
    },

    /// Run queued downloads until the queue drains.
    Run {
        /// Run up to N transfers at once (overrides the configured bound).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show status of all downloads.
    Status,

    /// Probe a URL's metadata (served from the cache when fresh).
    Probe {
        /// URL to probe with a HEAD request.
        url: String,

        /// Drop any cached metadata for the URL and probe again.
        #[arg(long)]
        refresh: bool,
    },

    /// Pause an active download (requires an active `adm run`).
    Pause {
        /// Download identifier (see `adm status`).
        id: String,
    },

    /// Resume a paused download.
    Resume {
        /// Download identifier.
        id: String,
    },

    /// Cancel a queued or running download and delete partial output.
    Cancel {
        /// Download identifier.
        id: String,
    },

    /// Remove a completed or failed download and delete its stored file.
    Remove {
        /// Download identifier.
        id: String,
    },

    /// Cancel and remove every download, deleting files.
    Clear,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = KvStore::open_default().await?;

        match cli.command {
            CliCommand::Add {
                url,
                title,
                group,
                dest_dir,
            } => run_add(&store, &cfg, &url, title, group, dest_dir).await?,
            CliCommand::Run { jobs } => run_scheduler(&store, &cfg, jobs).await?,
            CliCommand::Status => run_status(&store, &cfg).await?,
            CliCommand::Probe { url, refresh } => run_probe(&store, &cfg, &url, refresh).await?,
            CliCommand::Pause { id } => run_pause(&id).await?,
            CliCommand::Resume { id } => run_resume(&store, &cfg, &id).await?,
            CliCommand::Cancel { id } => run_cancel(&store, &cfg, &id).await?,
            CliCommand::Remove { id } => run_remove(&store, &cfg, &id).await?,
            CliCommand::Clear => run_clear(&store, &cfg).await?,
        }

        Ok(())
    }
}
