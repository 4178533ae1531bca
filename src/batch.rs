//! Window-by-window crawling of the work queue.
//!
//! The queue is cut into contiguous windows. Each window gets a freshly
//! launched rendering context, its links run one at a time, and its results
//! are persisted before the next window starts. A crash therefore loses at
//! most the window in flight.

use std::path::PathBuf;

use crate::config::DelayRange;
use crate::error::ScrapeError;
use crate::models::{ResultWindow, SongMap, WindowBounds};
use crate::progress::{create_progress_bar, log_line, log_progress};
use crate::render::Launcher;
use crate::session::{CrawlSession, Outcome};
use crate::shutdown::Sleeper;
use crate::store::DataLayout;

/// Where finished windows go.
pub trait WindowSink {
    fn persist(&mut self, window: &ResultWindow) -> Result<PathBuf, ScrapeError>;
}

impl WindowSink for DataLayout {
    fn persist(&mut self, window: &ResultWindow) -> Result<PathBuf, ScrapeError> {
        self.write_window(window)
    }
}

/// Per-outcome counts for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub scraped: usize,
    pub empty: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: usize,
}

impl Tally {
    pub fn processed(&self) -> usize {
        self.scraped + self.empty + self.rejected + self.skipped + self.failed
    }

    fn add(&mut self, other: &Tally) {
        self.scraped += other.scraped;
        self.empty += other.empty;
        self.rejected += other.rejected;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.warnings += other.warnings;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub window: ResultWindow,
    pub path: PathBuf,
    pub tally: Tally,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub windows: Vec<WindowReport>,
    /// Shutdown was requested; the last window may be partial.
    pub interrupted: bool,
}

impl BatchReport {
    pub fn totals(&self) -> Tally {
        let mut total = Tally::default();
        for report in &self.windows {
            total.add(&report.tally);
        }
        total
    }
}

pub struct BatchController<'a, L: Launcher> {
    launcher: L,
    session: CrawlSession<'a>,
    politeness_delay: DelayRange,
    sleeper: &'a dyn Sleeper,
}

impl<'a, L: Launcher> BatchController<'a, L> {
    pub fn new(
        launcher: L,
        session: CrawlSession<'a>,
        politeness_delay: DelayRange,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            launcher,
            session,
            politeness_delay,
            sleeper,
        }
    }

    pub fn into_launcher(self) -> L {
        self.launcher
    }

    /// Crawl `queue` in windows of `window_size`, persisting each through
    /// `sink` before starting the next.
    ///
    /// A launch or persistence failure aborts the run. On shutdown the
    /// links finished so far are persisted as a window with the bounds
    /// actually covered, and the run stops.
    pub fn run<S: WindowSink>(
        &mut self,
        queue: &[String],
        window_size: usize,
        sink: &mut S,
    ) -> Result<BatchReport, ScrapeError> {
        if window_size == 0 {
            return Err(ScrapeError::Config("window_size must be positive".into()));
        }

        let mut report = BatchReport::default();
        let windows = WindowBounds::partition(queue.len(), window_size);
        let total_windows = windows.len();

        for (index, bounds) in windows.into_iter().enumerate() {
            let mut renderer = self.launcher.launch()?;
            let pb = create_progress_bar(
                bounds.len() as u64,
                &format!("Window {}/{} {}", index + 1, total_windows, bounds),
            );

            let mut records = SongMap::new();
            let mut tally = Tally::default();
            let mut interrupted = false;

            for (offset, link) in queue[bounds.first..bounds.last].iter().enumerate() {
                let session = match self.session.run(&mut renderer, link, offset == 0) {
                    Ok(session) => session,
                    Err(_) => {
                        interrupted = true;
                        break;
                    }
                };

                for line in session.log_lines() {
                    log_line(&pb, line);
                }
                tally.warnings += session.warnings.len();
                match &session.outcome {
                    Ok(Outcome::Scraped(_)) => tally.scraped += 1,
                    Ok(Outcome::Empty) => tally.empty += 1,
                    Ok(Outcome::Rejected) => tally.rejected += 1,
                    Ok(Outcome::Skipped) => tally.skipped += 1,
                    Err(_) => tally.failed += 1,
                }
                let link = session.link.clone();
                if let Some(record) = session.into_record() {
                    records.insert(link, record);
                }

                pb.inc(1);
                log_progress("scrape", (offset + 1) as u64, bounds.len() as u64, 25);

                if self.sleeper.sleep(self.politeness_delay.sample()).is_err() {
                    interrupted = true;
                    break;
                }
            }

            self.launcher.shutdown(renderer);

            let covered = WindowBounds::new(bounds.first, bounds.first + tally.processed());
            if interrupted && covered.is_empty() {
                pb.finish_and_clear();
                report.interrupted = true;
                break;
            }

            let window = ResultWindow {
                bounds: covered,
                records,
            };
            let path = sink.persist(&window)?;
            pb.finish_with_message(format!(
                "Window {} saved: {} scraped, {} empty, {} rejected, {} failed",
                covered, tally.scraped, tally.empty, tally.rejected, tally.failed
            ));

            report.windows.push(WindowReport { window, path, tally });
            if interrupted {
                report.interrupted = true;
                break;
            }
        }

        Ok(report)
    }
}
