//! Generate config.toml and config.schema.json into the workspace schemas/ directory.
//!
//! Run with: cargo run -p tocaro-core --example generate_config

use std::path::PathBuf;

use anyhow::anyhow;
use tocaro_core::{APP_NAME, write_generated_files};

/// Repository URL for schema $id.
const REPO_URL: &str = "https://github.com/byteowlz/tocaro-export";

fn main() -> anyhow::Result<()> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    let workspace_root = PathBuf::from(&manifest_dir)
        .parent()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("could not find workspace root"))?;

    let schemas_dir = workspace_root.join("schemas");

    println!("Generating config files to {}...", schemas_dir.display());
    write_generated_files(&schemas_dir, APP_NAME, REPO_URL)?;
    println!("  - {}/config.schema.json", schemas_dir.display());
    println!("  - {}/config.toml", schemas_dir.display());

    Ok(())
}
