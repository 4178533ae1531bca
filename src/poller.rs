//! Stability polling for client-rendered content.
//!
//! Chord markup is filled in asynchronously and at variable latency, so a
//! fixed sleep either wastes time or truncates the chart. Instead the target
//! fragment is sampled repeatedly and accepted once two consecutive samples
//! are structurally identical.

use scraper::Html;
use std::time::Duration;
use thiserror::Error;

use crate::error::RenderError;
use crate::render::{Locator, Renderer};
use crate::shutdown::{Interrupted, Sleeper};

/// Structural fingerprint of a fragment at one polling instant.
///
/// The markup is re-serialized through the HTML parser, so differences in
/// attribute quoting or tag case between reads do not count as changes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawSample {
    fingerprint: String,
}

impl RawSample {
    fn of(markup: &str) -> Self {
        Self {
            fingerprint: Html::parse_fragment(markup).root_element().html(),
        }
    }
}

/// Settled (or best-effort) markup of the polled fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Two consecutive samples matched.
    Settled(Fragment),
    /// A negative locator matched: the page says the content is unavailable.
    Unavailable,
    /// Attempts exhausted; carries the last sample seen, if any.
    TimedOut(Option<Fragment>),
}

impl PollOutcome {
    /// Fragment to extract from, or `None` when absent.
    pub fn into_fragment(self) -> Option<Fragment> {
        match self {
            PollOutcome::Settled(f) => Some(f),
            PollOutcome::TimedOut(f) => f,
            PollOutcome::Unavailable => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// `floor(timeout / interval)` attempts, at least one, saturating at
/// `u32::MAX`.
pub fn attempt_budget(timeout: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    u32::try_from(timeout.as_nanos() / interval.as_nanos())
        .unwrap_or(u32::MAX)
        .max(1)
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityPoller {
    timeout: Duration,
    interval: Duration,
}

impl StabilityPoller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn max_attempts(&self) -> u32 {
        attempt_budget(self.timeout, self.interval)
    }

    /// Sample `locator` until it settles, a `negative` locator matches, or
    /// the attempt budget runs out.
    pub fn poll<R: Renderer>(
        &self,
        renderer: &R,
        page: &R::Page,
        locator: &Locator,
        negative: &[Locator],
        sleeper: &dyn Sleeper,
    ) -> Result<PollOutcome, PollError> {
        let attempts = self.max_attempts();
        let mut previous: Option<(RawSample, String)> = None;

        for attempt in 1..=attempts {
            if let Some(element) = renderer.query(page, locator)? {
                let markup = renderer.read_fragment(&element)?;
                let sample = RawSample::of(&markup);
                if previous.as_ref().is_some_and(|(prev, _)| *prev == sample) {
                    return Ok(PollOutcome::Settled(Fragment { markup }));
                }
                previous = Some((sample, markup));
            }

            for marker in negative {
                if renderer.query(page, marker)?.is_some() {
                    return Ok(PollOutcome::Unavailable);
                }
            }

            if attempt < attempts {
                sleeper.sleep(self.interval)?;
            }
        }

        Ok(PollOutcome::TimedOut(
            previous.map(|(_, markup)| Fragment { markup }),
        ))
    }
}
