use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use claim_tree::{write_file_atomic, Config, ProofLookup};

#[derive(Parser, Debug)]
#[command(name = "build-tree")]
#[command(about = "Rebuild the claim Merkle tree from the snapshot", long_about = None)]
pub struct Cli {
    /// Snapshot file (overrides the configured path)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Cache file the tree is persisted to (overrides the configured path)
    #[arg(short, long)]
    cache: Option<PathBuf>,

    /// Output file for the Merkle root
    #[arg(short, long)]
    root_output: Option<PathBuf>,
}

pub fn run(args: Cli, mut config: Config) -> Result<()> {
    if let Some(snapshot) = args.snapshot {
        config.snapshot.path = snapshot;
    }
    if let Some(cache) = args.cache {
        config.cache_path = cache;
    }

    println!("Reading snapshot from {:?}...", config.snapshot.path);
    let lookup = ProofLookup::from_config(&config);

    println!("Building Merkle tree...");
    let entry = lookup
        .cache()
        .rebuild()
        .context("Failed to build Merkle tree")?;

    println!("Total leaves: {}", entry.leaves.len());
    println!("Rejected records: {}", entry.rejected);
    println!("Merkle root: {}", entry.root);
    println!("Cache file: {:?}", config.cache_path);

    if let Some(root_path) = args.root_output {
        write_file_atomic(&root_path, &format!("{}\n", entry.root))
            .context("Failed to write root")?;
        println!("Root written to {:?}", root_path);
    }

    println!("Done!");
    Ok(())
}
