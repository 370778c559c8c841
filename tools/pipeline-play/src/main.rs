//! Manifest-driven pipeline runner.
//!
//! Loads a StreamWeave manifest, builds the components and pipelines it
//! declares, and plays every pipeline until a deadline or Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Validate a manifest without building anything
//! pipeline-play check manifests/quad-tiled.yaml
//!
//! # Play every declared pipeline until Ctrl-C
//! pipeline-play run manifests/quad-tiled.yaml
//!
//! # Play for ten seconds, then print per-sink frame counts
//! pipeline-play run manifests/remuxed-branches.yaml --duration 10 --stats
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamweave_core::{manifest, Services};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// StreamWeave pipeline runner
#[derive(Parser)]
#[command(name = "pipeline-play")]
#[command(author, version)]
#[command(about = "Build and play pipelines from a manifest")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a manifest without building anything
    Check {
        /// Manifest file (.yaml, .yml, or .json)
        manifest: PathBuf,
    },

    /// Build a manifest's components and play its pipelines
    Run {
        /// Manifest file (.yaml, .yml, or .json)
        manifest: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,

        /// Print per-sink frame counts after stopping
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log.as_str().into()))
        .init();

    match cli.command {
        Command::Check { manifest } => check(&manifest),
        Command::Run {
            manifest,
            duration,
            stats,
        } => run(&manifest, duration, stats).await,
    }
}

fn check(path: &Path) -> Result<()> {
    let manifest = manifest::load(path).with_context(|| format!("loading {}", path.display()))?;
    manifest::validate(&manifest)?;
    println!(
        "{}: {} components, {} pipelines",
        manifest.name.as_deref().unwrap_or("manifest"),
        manifest.components.len(),
        manifest.pipelines.len()
    );
    Ok(())
}

async fn run(path: &Path, duration: Option<u64>, stats: bool) -> Result<()> {
    let manifest = manifest::load(path).with_context(|| format!("loading {}", path.display()))?;
    let services = Services::global();
    manifest::apply(&manifest, services)?;

    let pipelines: Vec<String> = manifest
        .pipeline_names()
        .into_iter()
        .map(String::from)
        .collect();
    for name in &pipelines {
        services.pipeline_play(name).await?;
    }

    match duration {
        Some(secs) => {
            info!(secs, "playing until deadline");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        None => {
            info!("playing until Ctrl-C");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    for name in &pipelines {
        services.pipeline_stop(name).await?;
    }

    if stats {
        for sink in manifest.sink_names() {
            let frames = services.sink_frame_count_get(sink)?;
            println!("{sink}: {frames} frames");
        }
    }

    Ok(())
}
