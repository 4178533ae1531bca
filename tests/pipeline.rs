//! End-to-end runs of the link and chord pipeline over a temporary data root.

use rustc_hash::FxHashMap;
use tempfile::TempDir;

use chord_scrape::aggregate::{merge_layout, stats};
use chord_scrape::batch::BatchController;
use chord_scrape::config::ScrapeConfig;
use chord_scrape::links::{refresh_work_queue, unify_layout};
use chord_scrape::models::{SongMap, WindowBounds};
use chord_scrape::render::StaticLauncher;
use chord_scrape::session::CrawlSession;
use chord_scrape::shutdown::ShutdownSignal;
use chord_scrape::store::{read_json, write_json_atomic, DataLayout};

fn chart(chords: &[&str]) -> String {
    let spans: Vec<String> = chords
        .iter()
        .map(|c| format!("<span data-original-chord=\"{c}\">{c}</span>"))
        .collect();
    format!("<html><body><pre>[Verse]\n{}\nla la la</pre></body></html>", spans.join(" "))
}

fn site() -> FxHashMap<String, String> {
    let mut pages = FxHashMap::default();
    pages.insert("https://tabs.test/tab/1".to_string(), chart(&["C", "G", "Am"]));
    pages.insert("https://tabs.test/tab/2".to_string(), chart(&["D", "A", "Bm", "G", "D"]));
    pages.insert(
        "https://tabs.test/tab/3".to_string(),
        "<html><body><h2>This tab has been removed at the request of the publisher</h2></body></html>"
            .to_string(),
    );
    pages.insert("https://tabs.test/tab/4".to_string(), chart(&["E", "B"]));
    pages
}

fn config() -> ScrapeConfig {
    ScrapeConfig {
        poll_timeout_ms: 100,
        poll_interval_ms: 10,
        ..ScrapeConfig::default().without_delays()
    }
}

fn seed_links(layout: &DataLayout) {
    write_json_atomic(
        &layout.category_links("Rock"),
        &["https://tabs.test/tab/1", "https://tabs.test/tab/2", "https://tabs.test/tab/3"],
    )
    .unwrap();
    write_json_atomic(
        &layout.category_links("Pop"),
        &["https://tabs.test/tab/2", "https://tabs.test/tab/4", "https://tabs.test/tab/5"],
    )
    .unwrap();
}

fn scrape(layout: &mut DataLayout, queue: &[String], window_size: usize) -> chord_scrape::batch::BatchReport {
    let config = config();
    let signal = ShutdownSignal::never();
    let session = CrawlSession::new(&config, &signal).unwrap();
    let mut controller =
        BatchController::new(StaticLauncher::new(site()), session, config.politeness_delay, &signal);
    controller.run(queue, window_size, layout).unwrap()
}

#[test]
fn full_pipeline_produces_dataset_and_stats() {
    let dir = TempDir::new().unwrap();
    let mut layout = DataLayout::new(dir.path());
    seed_links(&layout);

    let unified = unify_layout(&layout).unwrap();
    assert_eq!(unified.len(), 5);

    let refresh = refresh_work_queue(&layout).unwrap();
    assert_eq!(refresh.queue.len(), 5);

    let report = scrape(&mut layout, &refresh.queue, 2);
    assert!(!report.interrupted);
    let totals = report.totals();
    assert_eq!(totals.scraped, 3);
    assert_eq!(totals.rejected, 1);
    // tab/5 does not exist on the site
    assert_eq!(totals.failed, 1);

    let bounds: Vec<WindowBounds> = layout.window_files().unwrap().into_iter().map(|(b, _)| b).collect();
    assert_eq!(
        bounds,
        vec![WindowBounds::new(0, 2), WindowBounds::new(2, 4), WindowBounds::new(4, 5)]
    );

    let merged = merge_layout(&layout).unwrap();
    assert_eq!(merged.dataset.len(), 3);
    for record in merged.dataset.values() {
        assert_eq!(record.count, record.chord_list.len());
        assert!(record.is_consistent());
    }

    let stats = stats(&merged.dataset).unwrap();
    assert_eq!(stats.song_count, 3);
    assert_eq!(stats.max_chords, 5);
    assert_eq!(stats.min_chords, 2);
    assert!((stats.avg_chords_per_song - 10.0 / 3.0).abs() < 1e-9);
}

#[test]
fn rerun_resumes_from_persisted_results() {
    let dir = TempDir::new().unwrap();
    let mut layout = DataLayout::new(dir.path());
    seed_links(&layout);
    unify_layout(&layout).unwrap();

    // First run only gets through part of the queue
    let first = refresh_work_queue(&layout).unwrap();
    scrape(&mut layout, &first.queue[..2], 2);

    let second = refresh_work_queue(&layout).unwrap();
    assert_eq!(second.dataset.len(), 2);
    assert!(second.queue.iter().all(|link| !second.dataset.contains_key(link)));
    assert_eq!(second.queue.len(), 3);

    // Overwriting window 0..2 is safe: its records were folded in above
    scrape(&mut layout, &second.queue, 2);
    let third = refresh_work_queue(&layout).unwrap();
    assert_eq!(third.dataset.len(), 3);
    // Rejected and missing pages stay queued for the next run
    assert_eq!(
        third.queue,
        vec!["https://tabs.test/tab/3".to_string(), "https://tabs.test/tab/5".to_string()]
    );

    let queued: Vec<String> = read_json(&layout.unscraped_links()).unwrap();
    assert_eq!(queued, third.queue);
    let canonical: SongMap = read_json(&layout.canonical_dataset()).unwrap();
    assert_eq!(canonical.len(), 3);
}

#[test]
fn window_size_one_writes_one_file_per_link() {
    let dir = TempDir::new().unwrap();
    let mut layout = DataLayout::new(dir.path());
    let queue = vec![
        "https://tabs.test/tab/1".to_string(),
        "https://tabs.test/tab/2".to_string(),
    ];

    scrape(&mut layout, &queue, 1);

    let first: SongMap = read_json(&layout.window_file(WindowBounds::new(0, 1))).unwrap();
    let second: SongMap = read_json(&layout.window_file(WindowBounds::new(1, 2))).unwrap();
    assert!(first.contains_key("https://tabs.test/tab/1"));
    assert!(second.contains_key("https://tabs.test/tab/2"));
}
