use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use pinglog::cli::{Args, Command};
use pinglog::config::Config;
use pinglog::engine::{Pinger, ProbeSource};
use pinglog::prefs::Prefs;
use pinglog::tracker::Supervisor;
use pinglog::transcript::{reconstruct_files, strip_reader};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Command::Loss { ref files }) => run_loss(files),
        Some(Command::Strip { ref file }) => run_strip(file),
        None => run_live(&args).await,
    }
}

/// Reconstruct loss intervals from saved transcripts
fn run_loss(files: &[PathBuf]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    reconstruct_files(files, &mut stdout)?;
    Ok(())
}

/// Print a transcript without color and bell sequences
fn run_strip(file: &Path) -> Result<()> {
    let input = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let mut stdout = io::stdout().lock();
    strip_reader(BufReader::new(input), &mut stdout)
        .with_context(|| format!("Failed to strip {}", file.display()))?;
    Ok(())
}

async fn run_live(args: &Args) -> Result<()> {
    let host = args.host.as_deref().context("No host specified")?;

    // Explicit flags override saved preferences
    let prefs = Prefs::load();
    let config = Config::new(args, &prefs)?;

    let pinger = Pinger::new(host, &config)
        .with_context(|| format!("Failed to resolve target: {}", host))?;
    log::debug!("Resolved {} to {}", host, pinger.target());

    Supervisor::new(pinger, config).run(io::stdout()).await
}
