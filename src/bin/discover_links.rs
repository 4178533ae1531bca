//! Crawl category listings and write one link file per category
//! Usage: cargo run --release --bin discover-links -- [--root DIR] [--genre Rock]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use chord_scrape::config::ScrapeConfig;
use chord_scrape::discovery::run_discovery;
use chord_scrape::progress::{format_duration, set_log_only};
use chord_scrape::render::HttpLauncher;
use chord_scrape::shutdown::install_ctrlc;
use chord_scrape::store::DataLayout;

#[derive(Parser)]
#[command(name = "discover-links")]
#[command(about = "Discover song links per category from the explore listings")]
struct Args {
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Only crawl these categories (repeatable, case-insensitive)
    #[arg(long = "genre")]
    genres: Vec<String>,

    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let config = ScrapeConfig::load(args.config.as_deref())?;
    let signal = install_ctrlc().context("Failed to install Ctrl+C handler")?;
    let layout = DataLayout::new(&args.root);
    let start = Instant::now();

    let mut launcher = HttpLauncher::new(config.user_agent.clone(), config.navigation_timeout());
    let states = run_discovery(&mut launcher, &config.discovery, &layout, &args.genres, &signal)?;

    println!("\n{:=<60}", "");
    for state in &states {
        println!(
            "  {:<12} {:>5} links  {:>3} pages  {} failed{}",
            state.name,
            state.links.len(),
            state.page,
            state.failed_pages,
            if state.completed { "" } else { "  (interrupted)" }
        );
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if states.iter().any(|s| !s.completed) {
        anyhow::bail!("interrupted; category files written so far are kept");
    }
    Ok(())
}
