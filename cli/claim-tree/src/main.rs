#![forbid(unsafe_code)]
#![allow(unreachable_pub)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use claim_tree::Config;

mod build_tree;
mod claim;
mod verify;

const DEFAULT_CONFIG: &str = "claim-tree.json";

#[derive(Parser, Debug)]
#[command(name = "claim-tree")]
#[command(about = "Snapshot airdrop Merkle tree tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (JSON)
    #[arg(short = 'C', long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    BuildTree(build_tree::Cli),
    Claim(claim::Cli),
    Verify(verify::Cli),
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None if PathBuf::from(DEFAULT_CONFIG).exists() => {
            Config::from_file(DEFAULT_CONFIG).context("Failed to load claim-tree.json")
        }
        None => Ok(Config::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Using cache {:?}, expiry {}s", config.cache_path, config.expiry_secs);

    match cli.command {
        Commands::BuildTree(args) => build_tree::run(args, config)?,
        Commands::Claim(args) => claim::run(args, &config)?,
        Commands::Verify(args) => verify::run(args)?,
    }

    Ok(())
}
