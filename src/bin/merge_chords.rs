//! Fold result windows into `all_chords.json` and print dataset statistics
//! Usage: cargo run --release --bin merge-chords -- [--root DIR] [--stats-out FILE]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use chord_scrape::aggregate::{merge_layout, stats};
use chord_scrape::progress::set_log_only;
use chord_scrape::safety::validate_output_path;
use chord_scrape::store::{write_json_atomic, DataLayout};

#[derive(Parser)]
#[command(name = "merge-chords")]
#[command(about = "Merge chord windows into the canonical dataset and report stats")]
struct Args {
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Also write the statistics JSON here
    #[arg(long)]
    stats_out: Option<PathBuf>,

    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);
    let layout = DataLayout::new(&args.root);

    let output = layout.canonical_dataset();
    let windows: Vec<PathBuf> = layout.window_files()?.into_iter().map(|(_, p)| p).collect();
    let window_refs: Vec<&std::path::Path> = windows.iter().map(|p| p.as_path()).collect();
    validate_output_path(&output, "all_chords", &window_refs)?;

    let report = merge_layout(&layout).context("Failed to merge chord windows")?;
    for link in &report.dropped {
        eprintln!("[DROPPED] {link}: empty or inconsistent record");
    }
    write_json_atomic(&output, &report.dataset)?;
    println!(
        "Merged {} windows ({} records) into {} songs -> {}",
        report.windows,
        report.records_read,
        report.dataset.len(),
        output.display()
    );

    let stats = stats(&report.dataset)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if let Some(path) = args.stats_out {
        validate_output_path(&path, "stats", &window_refs)?;
        stats.write_to_file(&path)?;
    }
    Ok(())
}
