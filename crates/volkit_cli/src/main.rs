//! volkit CLI
//!
//! Maintenance tools for needle volumes.
//!
//! # Commands
//!
//! - `transform` - Copy live needles, optionally encrypting and aging TTLs
//! - `clean` - Drop needles last modified before a cutoff
//! - `compact` - Drop stale and deleted needles
//! - `check` - Count needles a clean would drop
//! - `generate` - Rewrite last-modified times from a time source
//! - `backup` - Pull incremental replicas of remote volumes
//! - `cat` - Print one needle, decrypting it if asked

mod commands;

use clap::{Parser, Subcommand};
use commands::{CutoffArgs, VolumeArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use volkit_sync::VolumeTarget;

/// Needle volume maintenance tools.
#[derive(Parser)]
#[command(name = "volkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy live needles into a new volume
    Transform {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Encrypt needle data with the cipher key
        #[arg(long)]
        encrypt: bool,

        /// Reduce each TTL by the days the needle has been stored
        #[arg(long)]
        age_ttl: bool,

        /// Set last-modified times to the transform time
        #[arg(long)]
        touch_last_modified: bool,

        /// Stop after this many needles
        #[arg(short, long)]
        limit: Option<u64>,

        /// File holding the encoded cipher key (default: $ENCRYPTION_KEY)
        #[arg(long)]
        cipher_key_file: Option<PathBuf>,
    },

    /// Drop needles last modified before a cutoff
    Clean {
        #[command(flatten)]
        volume: VolumeArgs,

        #[command(flatten)]
        cutoff: CutoffArgs,

        /// Replace the source volume with the cleaned one
        #[arg(long)]
        in_place: bool,
    },

    /// Drop stale and deleted needles
    Compact {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Replace the source volume with the compacted one
        #[arg(long)]
        in_place: bool,
    },

    /// Count needles a clean with the same cutoff would drop
    Check {
        #[command(flatten)]
        volume: VolumeArgs,

        #[command(flatten)]
        cutoff: CutoffArgs,
    },

    /// Rewrite last-modified times
    Generate {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Time server base URL (default: the local clock)
        #[arg(long)]
        time_server: Option<String>,

        /// Days in the past the time server picks timestamps from
        #[arg(long, default_value = "30")]
        passed_days: u32,

        /// Count needles last modified before this time (YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        older_than: Option<String>,

        /// Time zone of `--older-than`
        #[arg(long, default_value = "local")]
        tz: String,
    },

    /// Pull incremental replicas of remote volumes
    Backup {
        /// Directory replicas are kept in
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Master server address
        #[arg(short, long, default_value = "localhost:9333")]
        master: String,

        /// Volumes to back up as `vid` or `collection:vid` (default: all)
        #[arg(long = "volume")]
        volumes: Vec<VolumeTarget>,

        /// Replica placement for new local volumes, e.g. `001`
        #[arg(long)]
        replication: Option<String>,

        /// Skip volumes the master reports as read-only
        #[arg(long)]
        skip_read_only: bool,

        /// Volumes backed up concurrently
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Attempts per volume before giving up
        #[arg(long, default_value = "6")]
        attempts: u32,

        /// Timeout for each request in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Print one needle
    Cat {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Needle id in hex
        #[arg(short, long)]
        needle: String,

        /// Decrypt the data with the cipher key
        #[arg(long)]
        decrypt: bool,

        /// File holding the encoded cipher key (default: $ENCRYPTION_KEY)
        #[arg(long)]
        cipher_key_file: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Transform {
            volume,
            encrypt,
            age_ttl,
            touch_last_modified,
            limit,
            cipher_key_file,
        } => {
            let options = commands::transform::TransformArgs {
                encrypt,
                age_ttl,
                touch_last_modified,
                limit,
                cipher_key_file,
            };
            commands::transform::run(&volume, &options)?;
        }
        Commands::Clean {
            volume,
            cutoff,
            in_place,
        } => {
            commands::clean::run(&volume, &cutoff, in_place)?;
        }
        Commands::Compact { volume, in_place } => {
            commands::compact::run(&volume, in_place)?;
        }
        Commands::Check { volume, cutoff } => {
            commands::check::run(&volume, &cutoff)?;
        }
        Commands::Generate {
            volume,
            time_server,
            passed_days,
            older_than,
            tz,
        } => {
            let cutoff = older_than.map(|cutoff| CutoffArgs { cutoff, tz });
            commands::generate::run(
                &volume,
                time_server.as_deref(),
                passed_days,
                cutoff.as_ref(),
            )?;
        }
        Commands::Backup {
            dir,
            master,
            volumes,
            replication,
            skip_read_only,
            workers,
            attempts,
            timeout,
        } => {
            let args = commands::backup::BackupArgs {
                dir,
                master,
                volumes,
                replication,
                skip_read_only,
                workers,
                attempts,
                timeout_secs: timeout,
            };
            commands::backup::run(&args)?;
        }
        Commands::Cat {
            volume,
            needle,
            decrypt,
            cipher_key_file,
        } => {
            commands::cat::run(&volume, &needle, decrypt, cipher_key_file.as_deref())?;
        }
    }

    Ok(())
}
