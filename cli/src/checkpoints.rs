use std::path::Path;

use anyhow::{Context, Result};
use gfkitchen_core::batch::{latest_checkpoint, merge_checkpoints, prune_checkpoints};
use gfkitchen_core::persist::write_json_atomic;

pub fn latest(dir: &Path) -> Result<()> {
    let Some((path, checkpoint)) = latest_checkpoint(dir)
        .with_context(|| format!("Failed to read checkpoints in {}", dir.display()))?
    else {
        println!("No checkpoints in {}", dir.display());
        return Ok(());
    };

    println!("Latest: {}", path.display());
    println!(
        "Written: {} ({} images)",
        checkpoint.metadata.timestamp.to_rfc3339(),
        checkpoint.metadata.total_generated
    );
    println!("{}", serde_json::to_string_pretty(&checkpoint)?);

    Ok(())
}

pub fn merge(dir: &Path, output: Option<&Path>) -> Result<()> {
    let merged = merge_checkpoints(dir)
        .with_context(|| format!("Failed to merge checkpoints in {}", dir.display()))?;

    match output {
        Some(path) => {
            write_json_atomic(path, &merged)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} images to {}", merged.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&merged)?),
    }

    Ok(())
}

pub fn prune(dir: &Path, keep: usize) -> Result<()> {
    let removed = prune_checkpoints(dir, keep)
        .with_context(|| format!("Failed to prune checkpoints in {}", dir.display()))?;

    for path in &removed {
        println!("Removed {}", path.display());
    }
    println!("Pruned {} checkpoint(s), kept up to {}", removed.len(), keep);

    Ok(())
}
