//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `mkdir`, `ls`, `rm`, `rmdir`, `put`, and `upload`.
//!
//! Examples:
//! ```bash
//! s3fs-cli mkdir   photos/2025
//! s3fs-cli ls      photos/
//! s3fs-cli put     notes.txt photos/notes.txt       # single PutObject
//! s3fs-cli upload  HUGE_FILE.zip backups/HUGE.zip   # streamed, multipart when large
//! s3fs-cli rm      photos/notes.txt
//! s3fs-cli rmdir   photos/                          # delete everything under prefix
//! ```
//!
//! Bucket, region and credentials come from the environment (or `.env`):
//! `AWS_REGION`, `S3_BUCKET`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use s3fs_stream::{
    ObjectStoreClient, ReadDir, S3Client, S3Config, S3Fs, Status, WriteStreamOptions,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Prefix every path is resolved against.
    #[arg(long = "base-path", default_value = "")]
    base_path: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a directory marker object (`path/`).
    Mkdir { path: String },

    /// List every key under a prefix.
    Ls { path: String },

    /// Delete a single object.
    Rm { path: String },

    /// Delete every object under a prefix.
    Rmdir { path: String },

    /// Upload a local file with one PutObject.
    Put { file: PathBuf, path: String },

    /// Stream a local file; switches to multipart upload for large files.
    Upload {
        file: PathBuf,
        path: String,

        /// Maximum concurrent part uploads.
        #[arg(short = 'j', long = "jobs", default_value_t = 16)]
        jobs: usize,
    },
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let cfg = S3Config::from_env().context("loading S3 configuration")?;
    let client: Arc<dyn ObjectStoreClient> = Arc::new(S3Client::connect(&cfg).await?);
    let fs = S3Fs::new(client, cli.base_path);

    match cli.cmd {
        Command::Mkdir { path } => {
            check_status("mkdir", &path, fs.mkdir(&path).await)?;
            safe_println!("created {}", fs.resolve(&path));
        }

        Command::Ls { path } => match fs.readdir(&path).await {
            ReadDir::Entries(entries) => {
                for entry in entries {
                    safe_println!("{}", entry);
                }
            }
            ReadDir::NotFound => bail!("{}: no such directory", fs.resolve(&path)),
            ReadDir::Fail => bail!("{}: listing failed", fs.resolve(&path)),
        },

        Command::Rm { path } => {
            check_status("rm", &path, fs.rm(&path).await)?;
        }

        Command::Rmdir { path } => {
            check_status("rmdir", &path, fs.rmdir(&path).await)?;
        }

        Command::Put { file, path } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let len = data.len();
            check_status("put", &path, fs.write_file(&path, data).await)?;
            safe_println!("uploaded {} bytes to {}", len, fs.resolve(&path));
        }

        Command::Upload { file, path, jobs } => {
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let opts = WriteStreamOptions { max_in_flight: jobs, ..Default::default() };
            let mut stream = fs.create_write_stream(&path, opts);

            let t0 = Instant::now();
            stream.start().await?;
            let outcome = stream.copy_from_reader(reader).await?;
            let secs = t0.elapsed().as_secs_f64();

            info!("{:?} upload of {} finished in {:.2}s", outcome.strategy, outcome.key, secs);
            safe_println!(
                "uploaded {} bytes to {} ({:?}, {} parts, {})",
                outcome.total_bytes,
                outcome.key,
                outcome.strategy,
                outcome.parts,
                outcome.checksum
            );
        }
    }

    Ok(())
}

fn check_status(op: &str, path: &str, status: Status) -> Result<()> {
    match status {
        Status::Ok => Ok(()),
        Status::NotFound => bail!("{op} {path}: not found"),
        Status::Fail => bail!("{op} {path}: failed"),
    }
}
