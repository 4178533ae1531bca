//! One crawl session: open a link, validate it, wait for the chart to
//! settle, extract chords, close the page.
//!
//! Per-link failures never escape a session. They come back as a
//! [`SessionReport`] whose `outcome` is `Err(FailureKind)` or whose
//! `warnings` carry the non-fatal kinds (parse, release). Only a shutdown
//! request ends a session early, and even then the page is closed first.

use std::fmt;

use crate::chords::ChordExtractor;
use crate::config::{DelayRange, ScrapeConfig};
use crate::error::{FailureKind, ScrapeError};
use crate::models::SongRecord;
use crate::poller::{PollError, PollOutcome, StabilityPoller};
use crate::render::{Locator, Renderer};
use crate::shutdown::{Interrupted, Sleeper};
use crate::validity::ValidityClassifier;

/// Where a session got to. Every report is produced after the page is
/// released, so the report keeps the last state reached before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Opened,
    Validated,
    Rejected,
    Extracted,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Pending => "pending",
            SessionState::Opened => "opened",
            SessionState::Validated => "validated",
            SessionState::Rejected => "rejected",
            SessionState::Extracted => "extracted",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Stored under the link.
    Scraped(SongRecord),
    /// Page rendered but had no usable chords. Not stored.
    Empty,
    /// Page carried a removal or licensing marker. Not stored.
    Rejected,
    /// Link excluded by the link filter, never opened.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub link: String,
    pub state: SessionState,
    pub outcome: Result<Outcome, FailureKind>,
    /// Recovered failures: a parse error (reported as empty) or a page that
    /// could not be closed.
    pub warnings: Vec<FailureKind>,
}

impl SessionReport {
    fn new(link: &str, state: SessionState, outcome: Result<Outcome, FailureKind>) -> Self {
        Self {
            link: link.to_string(),
            state,
            outcome,
            warnings: Vec::new(),
        }
    }

    /// The record to store, if any.
    pub fn record(&self) -> Option<&SongRecord> {
        match &self.outcome {
            Ok(Outcome::Scraped(record)) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<SongRecord> {
        match self.outcome {
            Ok(Outcome::Scraped(record)) => Some(record),
            _ => None,
        }
    }

    /// One line per outcome plus one per warning.
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines = vec![match &self.outcome {
            Ok(Outcome::Scraped(record)) => {
                format!("[OK] {} ({} chords, {} unique)", self.link, record.count, record.chord_set.len())
            }
            Ok(Outcome::Empty) => format!("[EMPTY] {}", self.link),
            Ok(Outcome::Rejected) => format!("[REJECTED] {}", self.link),
            Ok(Outcome::Skipped) => format!("[SKIP] {}", self.link),
            Err(kind) => format!("[FAIL:{}] {} at {}: {}", kind.tag(), self.link, self.state, kind),
        }];
        lines.extend(
            self.warnings
                .iter()
                .map(|kind| format!("[FAIL:{}] {}: {}", kind.tag(), self.link, kind)),
        );
        lines
    }
}

/// Everything a session needs, built once per run.
pub struct CrawlSession<'a> {
    poller: StabilityPoller,
    classifier: ValidityClassifier,
    extractor: Box<dyn ChordExtractor>,
    content_locator: Locator,
    settle_delay: DelayRange,
    warmup_delay: DelayRange,
    min_chords: usize,
    link_filter: Option<String>,
    sleeper: &'a dyn Sleeper,
}

impl<'a> CrawlSession<'a> {
    pub fn new(config: &ScrapeConfig, sleeper: &'a dyn Sleeper) -> Result<Self, ScrapeError> {
        let extractor = config
            .strategy
            .build(&config.chord_attribute, config.capture_sections)
            .map_err(|e| ScrapeError::Config(e.to_string()))?;
        Ok(Self::with_extractor(config, extractor, sleeper))
    }

    /// Session with a caller-supplied extractor in place of the configured
    /// strategy.
    pub fn with_extractor(
        config: &ScrapeConfig,
        extractor: Box<dyn ChordExtractor>,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            poller: StabilityPoller::new(config.poll_timeout(), config.poll_interval()),
            classifier: ValidityClassifier::new(config.removal_markers.clone()),
            extractor,
            content_locator: config.content_locator.clone(),
            settle_delay: config.settle_delay,
            warmup_delay: config.warmup_delay,
            min_chords: config.min_chords,
            link_filter: config.link_filter.clone(),
            sleeper,
        }
    }

    /// Process one link. `fresh_context` is true for the first link of a
    /// newly launched rendering context, which gets an extra warm-up wait.
    pub fn run<R: Renderer>(
        &self,
        renderer: &mut R,
        link: &str,
        fresh_context: bool,
    ) -> Result<SessionReport, Interrupted> {
        if let Some(filter) = &self.link_filter {
            if !link.contains(filter.as_str()) {
                return Ok(SessionReport::new(link, SessionState::Pending, Ok(Outcome::Skipped)));
            }
        }

        if fresh_context {
            self.sleeper.sleep(self.warmup_delay.sample())?;
        }

        let page = match renderer.open(link) {
            Ok(page) => page,
            Err(e) => {
                return Ok(SessionReport::new(link, SessionState::Failed, Err(e.into())));
            }
        };

        let mut report = SessionReport::new(link, SessionState::Opened, Ok(Outcome::Empty));
        let visited = self.visit(renderer, &page, &mut report);

        // Released on every path, including shutdown
        if let Err(e) = renderer.close(page) {
            report.warnings.push(FailureKind::ResourceRelease(e.to_string()));
        }

        visited?;
        Ok(report)
    }

    fn visit<R: Renderer>(
        &self,
        renderer: &R,
        page: &R::Page,
        report: &mut SessionReport,
    ) -> Result<(), Interrupted> {
        self.sleeper.sleep(self.settle_delay.sample())?;

        match self.classifier.is_valid(renderer, page) {
            Ok(true) => report.state = SessionState::Validated,
            Ok(false) => {
                report.state = SessionState::Rejected;
                report.outcome = Ok(Outcome::Rejected);
                return Ok(());
            }
            Err(e) => {
                report.state = SessionState::Failed;
                report.outcome = Err(e.into());
                return Ok(());
            }
        }

        let polled = self.poller.poll(
            renderer,
            page,
            &self.content_locator,
            self.classifier.markers(),
            self.sleeper,
        );
        let fragment = match polled {
            Ok(PollOutcome::Unavailable) => {
                report.state = SessionState::Rejected;
                report.outcome = Ok(Outcome::Rejected);
                return Ok(());
            }
            Ok(outcome) => outcome.into_fragment(),
            Err(PollError::Interrupted(interrupted)) => return Err(interrupted),
            Err(PollError::Render(e)) => {
                report.state = SessionState::Failed;
                report.outcome = Err(e.into());
                return Ok(());
            }
        };

        report.state = SessionState::Extracted;
        let Some(fragment) = fragment else {
            report.outcome = Ok(Outcome::Empty);
            return Ok(());
        };

        report.outcome = match self.extractor.extract(&fragment.markup) {
            Ok(record) if record.count >= self.min_chords => Ok(Outcome::Scraped(record)),
            Ok(_) => Ok(Outcome::Empty),
            Err(e) => {
                report.warnings.push(FailureKind::Parse(e.to_string()));
                Ok(Outcome::Empty)
            }
        };
        Ok(())
    }
}
