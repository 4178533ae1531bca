//! Union every `<category>_links.json` into `unique_links.json`
//! Usage: cargo run --release --bin unify-links -- [--root DIR]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use chord_scrape::links::unify_layout;
use chord_scrape::safety::validate_output_path;
use chord_scrape::store::DataLayout;

#[derive(Parser)]
#[command(name = "unify-links")]
#[command(about = "Merge per-category link lists into one deduplicated set")]
struct Args {
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let layout = DataLayout::new(&args.root);

    let inputs = layout.category_link_files()?;
    let input_refs: Vec<&std::path::Path> = inputs.iter().map(|p| p.as_path()).collect();
    validate_output_path(&layout.unique_links(), "unique", &input_refs)?;

    println!("Reading {} category files from {}", inputs.len(), layout.scraped_dir().display());
    let unified = unify_layout(&layout).context("Failed to unify link lists")?;
    println!("Wrote {} unique links to {}", unified.len(), layout.unique_links().display());
    Ok(())
}
