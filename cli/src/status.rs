use std::path::Path;

use anyhow::{Context, Result};
use gfkitchen_core::batch::{BatchPaths, ItemStatus, StateStore};

use crate::generate::load_catalog;

pub fn print_status(paths: &BatchPaths) -> Result<()> {
    let state_file = paths.state_file();
    if !state_file.exists() {
        println!("No state file at {}", state_file.display());
        println!("Run `gfkitchen generate` to start.");
        return Ok(());
    }

    let state = StateStore::load(&state_file)
        .with_context(|| format!("Failed to load state from {}", state_file.display()))?;
    let counts = state.counts();
    let total = counts.pending + counts.done + counts.failed;

    println!("State: {}", state_file.display());
    println!("Tracked recipes: {}", total);
    println!("  Done: {}", counts.done);
    println!("  Failed: {}", counts.failed);
    println!("  Pending: {}", counts.pending);

    if counts.failed > 0 {
        println!();
        println!("Failed:");
        for (slug, item) in state.items().filter(|(_, i)| i.status == ItemStatus::Failed) {
            let kind = item
                .error_kind
                .map(|k| format!("{:?}", k))
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {} [{}] after {} attempt(s): {}",
                slug,
                kind,
                item.attempts,
                item.last_error.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

pub fn print_recipes(file: Option<&Path>) -> Result<()> {
    let recipes = load_catalog(file)?;

    let mut categories: Vec<&str> = recipes.iter().map(|r| r.category.as_str()).collect();
    categories.sort_unstable();
    categories.dedup();

    for category in &categories {
        println!("{}:", category);
        for recipe in recipes.iter().filter(|r| r.category == *category) {
            println!("  {:<28} {}", recipe.slug, recipe.title);
        }
    }

    println!();
    println!(
        "{} recipes in {} categories",
        recipes.len(),
        categories.len()
    );

    Ok(())
}
