use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use claim_tree::{normalize_address, write_file_atomic, ClaimProof, Config, ProofLookup};

#[derive(Parser, Debug)]
#[command(name = "claim")]
#[command(about = "Look up the allocation and Merkle proof for an address", long_about = None)]
pub struct Cli {
    /// Claim address (any casing)
    #[arg(short, long)]
    address: String,

    /// Output JSON file. Printed to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimOutput {
    pub root: String,
    pub address: String,
    pub value: String,
    pub proof: Vec<String>,
    pub exists: bool,
}

impl ClaimOutput {
    fn new(address: String, found: ClaimProof) -> Self {
        Self {
            root: found.root,
            address,
            value: found.value,
            proof: found.proof,
            exists: found.exists,
        }
    }
}

pub fn run(args: Cli, config: &Config) -> Result<()> {
    let address = normalize_address(&args.address).context("Address is required")?;

    let lookup = ProofLookup::from_config(config);
    let found = lookup
        .lookup(&address)
        .context("Failed to look up Merkle proof")?;
    let claim = ClaimOutput::new(address, found);

    let json_output = serde_json::to_string_pretty(&claim).context("Failed to serialize JSON")?;
    match args.output {
        Some(path) => {
            println!("Writing claim JSON to {:?}...", path);
            write_file_atomic(&path, &json_output).context("Failed to write claim file")?;
        }
        None => println!("{}", json_output),
    }

    if claim.exists {
        eprintln!("Address {} can claim {}", claim.address, claim.value);
        eprintln!("Proof length: {} nodes", claim.proof.len());
    } else {
        eprintln!("Address {} is not in the snapshot", claim.address);
    }

    Ok(())
}
