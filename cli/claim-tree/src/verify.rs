use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use claim_tree::{parse_hash, verify_claim};

use crate::claim::ClaimOutput;

#[derive(Parser, Debug)]
#[command(name = "verify")]
#[command(about = "Check a claim JSON against a Merkle root", long_about = None)]
pub struct Cli {
    /// Claim JSON produced by the `claim` command
    #[arg(short, long)]
    input: PathBuf,

    /// Expected Merkle root (hex). Defaults to the root inside the claim
    #[arg(short, long)]
    root: Option<String>,
}

pub fn run(args: Cli) -> Result<()> {
    println!("Reading claim from {:?}...", args.input);
    let content = fs::read_to_string(&args.input).context("Failed to read claim file")?;
    let claim: ClaimOutput = serde_json::from_str(&content).context("Failed to parse claim JSON")?;

    let root = args.root.unwrap_or_else(|| claim.root.clone());
    parse_hash(&root).context("Invalid Merkle root")?;

    if !claim.exists {
        anyhow::bail!("Claim for {} has no allocation in the snapshot", claim.address);
    }

    let valid = verify_claim(&root, &claim.address, &claim.value, &claim.proof)
        .context("Malformed proof")?;
    if !valid {
        anyhow::bail!(
            "Proof for {} (value {}) does not match root {}",
            claim.address,
            claim.value,
            root
        );
    }

    println!("\nProof verified!");
    println!("Address: {}", claim.address);
    println!("Value: {}", claim.value);
    println!("Root: {}", root);
    println!("Proof length: {} nodes", claim.proof.len());

    Ok(())
}
