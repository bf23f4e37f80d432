//! bundlepack CLI
//!
//! Builds bundles and catalogs from a TOML build configuration

use anyhow::{bail, Context};
use bundlepack::{BuildSettings, ContentState, PackerBuilder};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bundlepack")]
#[command(about = "Pack content entries into bundles and write their catalogs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a build
    Build {
        /// Path to the build configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Directory entry asset paths are relative to
        #[arg(long, default_value = ".")]
        content: PathBuf,

        /// Content state of a shipped build (makes this a content-update build)
        #[arg(long)]
        previous_state: Option<PathBuf>,

        /// zstd compression level
        #[arg(long)]
        level: Option<i32>,

        /// Print the build result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report whether build output exists
    Status {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Delete build output
    Clean {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Build {
            config,
            content,
            previous_state,
            level,
            json,
        } => {
            let previous = previous_state
                .map(|path| {
                    ContentState::load(&path)
                        .with_context(|| format!("loading content state {}", path.display()))
                })
                .transpose()?;

            let mut builder = PackerBuilder::new().config_file(&config).content_root(content);
            if let Some(level) = level {
                builder = builder.compression_level(level);
            }
            let mut pipeline = builder
                .build()
                .with_context(|| format!("loading {}", config.display()))?;

            info!("Building from {}", config.display());
            let result = pipeline.build(previous.as_ref());

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{} locations, {} bundles in {:.2}s",
                    result.location_count,
                    result.bundle_results.len(),
                    result.duration
                );
                if let Some(path) = &result.output_path {
                    println!("settings: {}", path.display());
                }
                if let Some(path) = &result.content_state_path {
                    println!("content state: {}", path.display());
                }
            }

            if let Some(error) = result.error {
                bail!(error);
            }
        }
        Command::Status { config } => {
            let pipeline = pipeline_for(&config)?;
            if pipeline.is_data_built() {
                println!("built");
            } else {
                println!("not built");
            }
        }
        Command::Clean { config } => {
            pipeline_for(&config)?.clear_cached_data()?;
            println!("cleaned");
        }
    }

    Ok(())
}

fn pipeline_for(config: &Path) -> anyhow::Result<bundlepack::BuildPipeline> {
    let settings = BuildSettings::load(config)
        .with_context(|| format!("loading {}", config.display()))?;
    Ok(PackerBuilder::new().settings(settings).build()?)
}
