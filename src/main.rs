use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use chord_scrape::batch::BatchController;
use chord_scrape::config::ScrapeConfig;
use chord_scrape::links::refresh_work_queue;
use chord_scrape::progress::{format_duration, set_log_only};
use chord_scrape::render::HttpLauncher;
use chord_scrape::session::CrawlSession;
use chord_scrape::shutdown::install_ctrlc;
use chord_scrape::store::DataLayout;

#[derive(Parser)]
#[command(name = "scrape-chords")]
#[command(about = "Scrape chord charts for every known link not yet in the dataset")]
struct Args {
    /// Data root holding scraped_data/ and all_chords/
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// JSON file overriding any configuration field
    #[arg(long)]
    config: Option<PathBuf>,

    /// Links per rendering context (overrides the config file)
    #[arg(long)]
    window_size: Option<usize>,

    /// Stop after this many links of the queue
    #[arg(long)]
    limit: Option<usize>,

    /// Disable progress bars, emit periodic log lines instead
    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let mut config = ScrapeConfig::load(args.config.as_deref())?;
    if let Some(size) = args.window_size {
        config.window_size = size;
        config.validate()?;
    }

    let start = Instant::now();
    let signal = install_ctrlc().context("Failed to install Ctrl+C handler")?;
    let mut layout = DataLayout::new(&args.root);

    eprintln!("Data root: {}", layout.root().display());
    let refresh = refresh_work_queue(&layout).context("Failed to compute work queue")?;
    eprintln!(
        "Known links: {}, already scraped: {}, pending: {}",
        refresh.known_links,
        refresh.dataset.len(),
        refresh.queue.len()
    );

    let mut queue = refresh.queue;
    if let Some(limit) = args.limit {
        queue.truncate(limit);
    }
    if queue.is_empty() {
        eprintln!("Nothing to scrape.");
        return Ok(());
    }

    let session = CrawlSession::new(&config, &signal)?;
    let launcher = HttpLauncher::new(config.user_agent.clone(), config.navigation_timeout());
    let mut controller = BatchController::new(launcher, session, config.politeness_delay, &signal);
    let report = controller.run(&queue, config.window_size, &mut layout)?;

    let totals = report.totals();
    println!("\n{:=<60}", "");
    println!("{}", if report.interrupted { "Scrape interrupted." } else { "Scrape complete!" });
    println!("  Windows written: {}", report.windows.len());
    println!("  Links processed: {}/{}", totals.processed(), queue.len());
    println!("  Scraped: {}", totals.scraped);
    println!("  Empty: {}", totals.empty);
    println!("  Rejected: {}", totals.rejected);
    println!("  Skipped: {}", totals.skipped);
    println!("  Failed: {}", totals.failed);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if report.interrupted {
        bail!("interrupted after {} links; rerun to resume", totals.processed());
    }
    Ok(())
}
