//! Run configuration.
//!
//! Every field has a default tuned for the chord site, so the drivers run
//! without a config file. A JSON file may override any subset of fields.

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::chords::Strategy;
use crate::error::ScrapeError;
use crate::render::Locator;

// ============================================================================
// Defaults
// ============================================================================

/// Links processed under one rendering context before it is restarted.
pub const DEFAULT_WINDOW_SIZE: usize = 200;

/// Max songs collected per category
pub const DEFAULT_SONG_CAP: usize = 4000;

/// Listing pages visited per category before giving up
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Songs per listing page
pub const SONGS_PER_PAGE: usize = 50;

pub const LICENSING_MARKER: &str =
    "a[href='https://www.ultimate-guitar.com/article/blog/licensing']";

pub const REMOVAL_NOTICE: &str = "This tab has been removed at the request of the publisher";

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

// ============================================================================
// Delay ranges
// ============================================================================

/// Uniformly jittered delay in `[min_ms, max_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub const fn zero() -> Self {
        Self::fixed(0)
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    fn validate(&self, name: &str) -> Result<(), ScrapeError> {
        if self.min_ms > self.max_ms {
            return Err(ScrapeError::Config(format!(
                "{name}: min_ms {} exceeds max_ms {}",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Scrape configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub window_size: usize,

    /// Upper bound on opening one page
    pub navigation_timeout_ms: u64,

    /// Stability poll budget and sampling interval
    pub poll_timeout_ms: u64,
    pub poll_interval_ms: u64,

    /// Wait after opening a page, before validating it
    pub settle_delay: DelayRange,
    /// Extra wait before the first link of every fresh context
    pub warmup_delay: DelayRange,
    /// Wait after every session, whatever its outcome
    pub politeness_delay: DelayRange,

    /// Fragment holding the chord chart
    pub content_locator: Locator,
    pub strategy: Strategy,
    /// Attribute that marks an inline chord element (attribute strategy)
    pub chord_attribute: String,
    pub capture_sections: bool,

    /// Markers meaning "content removed/unlicensed"; any match rejects the page
    pub removal_markers: Vec<Locator>,

    /// Results with fewer chords are reported as empty, never stored
    pub min_chords: usize,
    /// Only links containing this substring are opened
    pub link_filter: Option<String>,

    pub user_agent: String,

    pub discovery: DiscoveryConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            navigation_timeout_ms: 30_000,
            poll_timeout_ms: 6_000,
            poll_interval_ms: 200,
            settle_delay: DelayRange::new(1_500, 1_800),
            warmup_delay: DelayRange::fixed(500),
            politeness_delay: DelayRange::new(0, 300),
            content_locator: Locator::css("pre"),
            strategy: Strategy::Attribute,
            chord_attribute: "data-original-chord".to_string(),
            capture_sections: false,
            removal_markers: vec![Locator::css(LICENSING_MARKER), Locator::text(REMOVAL_NOTICE)],
            min_chords: 1,
            link_filter: None,
            user_agent: MOBILE_USER_AGENT.to_string(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl ScrapeConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.window_size == 0 {
            return Err(ScrapeError::Config("window_size must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ScrapeError::Config("poll_interval_ms must be positive".into()));
        }
        if self.min_chords == 0 {
            return Err(ScrapeError::Config(
                "min_chords must be at least 1; empty records are never stored".into(),
            ));
        }
        self.settle_delay.validate("settle_delay")?;
        self.warmup_delay.validate("warmup_delay")?;
        self.politeness_delay.validate("politeness_delay")?;
        self.discovery.validate()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// A configuration with every delay zeroed, for offline runs and tests.
    pub fn without_delays(mut self) -> Self {
        self.settle_delay = DelayRange::zero();
        self.warmup_delay = DelayRange::zero();
        self.politeness_delay = DelayRange::zero();
        self.discovery.page_delay = DelayRange::zero();
        self.discovery.between_pages_delay = DelayRange::zero();
        self
    }
}

// ============================================================================
// Discovery configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Listing URL template; `{genre}` and `{page}` are substituted
    pub explore_url: String,
    /// Category id -> display name
    pub genres: BTreeMap<u32, String>,
    pub song_cap: usize,
    pub page_limit: usize,
    pub link_locator: Locator,
    pub min_links: usize,
    /// Accept `min_links - tolerance` links once the wait times out
    pub min_links_tolerance: usize,
    pub link_wait_timeout_ms: u64,
    pub link_wait_interval_ms: u64,
    pub page_delay: DelayRange,
    pub between_pages_delay: DelayRange,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let genres = [
            (4, "Rock"),
            (8, "Metal"),
            (14, "Pop"),
            (666, "Folk"),
            (49, "Country"),
            (1787, "RnB"),
            (16, "Electronic"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

        Self {
            explore_url: "https://www.ultimate-guitar.com/explore?order=hitstotal_desc\
                          &genres[]={genre}&page={page}&type[]=Chords"
                .to_string(),
            genres,
            song_cap: DEFAULT_SONG_CAP,
            page_limit: DEFAULT_PAGE_LIMIT,
            link_locator: Locator::css("a[tabcount]"),
            min_links: SONGS_PER_PAGE,
            min_links_tolerance: 5,
            link_wait_timeout_ms: 8_000,
            link_wait_interval_ms: 250,
            page_delay: DelayRange::new(1_500, 2_500),
            between_pages_delay: DelayRange::new(0, 1_000),
        }
    }
}

impl DiscoveryConfig {
    pub fn page_url(&self, genre: u32, page: usize) -> String {
        self.explore_url
            .replace("{genre}", &genre.to_string())
            .replace("{page}", &page.to_string())
    }

    pub fn link_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.link_wait_timeout_ms)
    }

    pub fn link_wait_interval(&self) -> Duration {
        Duration::from_millis(self.link_wait_interval_ms)
    }

    fn validate(&self) -> Result<(), ScrapeError> {
        if self.link_wait_interval_ms == 0 {
            return Err(ScrapeError::Config(
                "discovery.link_wait_interval_ms must be positive".into(),
            ));
        }
        self.page_delay.validate("discovery.page_delay")?;
        self.between_pages_delay.validate("discovery.between_pages_delay")
    }
}
