//! Category link discovery.
//!
//! Each category's listing is paged in popularity order. A page counts once
//! it shows at least `min_links` song anchors (or a few fewer once the wait
//! times out). Songs are deduplicated by normalized title, since the same
//! song appears under several chart versions.

use rustc_hash::FxHashSet;
use scraper::Html;

use crate::config::DiscoveryConfig;
use crate::error::{RenderError, ScrapeError};
use crate::normalize::{normalize_title, resolve_link};
use crate::poller::attempt_budget;
use crate::progress::{create_progress_bar, log_line};
use crate::render::{parse_selector, Launcher, Locator, Renderer};
use crate::shutdown::{Interrupted, Sleeper};
use crate::store::{write_json_atomic, DataLayout};

/// One song anchor on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub title: String,
    pub href: String,
}

/// Progress of one category crawl.
#[derive(Debug, Clone)]
pub struct GenreCrawlState {
    pub genre_id: u32,
    pub name: String,
    /// Last listing page visited (1-based)
    pub page: usize,
    pub links: Vec<String>,
    titles: FxHashSet<String>,
    pub failed_pages: usize,
    /// False when shutdown cut the crawl short
    pub completed: bool,
}

impl GenreCrawlState {
    pub fn new(genre_id: u32, name: impl Into<String>) -> Self {
        Self {
            genre_id,
            name: name.into(),
            page: 0,
            links: Vec::new(),
            titles: FxHashSet::default(),
            failed_pages: 0,
            completed: false,
        }
    }

    /// Add anchors from one page; returns how many were new.
    fn absorb(&mut self, page_url: &str, anchors: Vec<ListingLink>, cap: usize) -> usize {
        let before = self.links.len();
        for anchor in anchors {
            if self.links.len() >= cap {
                break;
            }
            let Some(link) = resolve_link(page_url, &anchor.href) else {
                continue;
            };
            if self.titles.insert(normalize_title(&anchor.title)) {
                self.links.push(link);
            }
        }
        self.links.len() - before
    }
}

/// Wait until `locator` matches at least `min` elements.
///
/// On timeout the last match is accepted if it holds at least
/// `min - tolerance` elements, otherwise nothing is returned. Query errors
/// during the wait count as zero matches.
pub fn wait_for_min_links<R: Renderer>(
    renderer: &R,
    page: &R::Page,
    locator: &Locator,
    config: &DiscoveryConfig,
    sleeper: &dyn Sleeper,
) -> Result<Vec<R::Element>, Interrupted> {
    let interval = config.link_wait_interval();
    let attempts = attempt_budget(config.link_wait_timeout(), interval);

    let mut last = Vec::new();
    for attempt in 1..=attempts {
        last = renderer.query_all(page, locator).unwrap_or_default();
        if last.len() >= config.min_links {
            return Ok(last);
        }
        if attempt < attempts {
            sleeper.sleep(interval)?;
        }
    }

    if last.len() >= config.min_links.saturating_sub(config.min_links_tolerance) {
        Ok(last)
    } else {
        Ok(Vec::new())
    }
}

/// Title text and `href` of an anchor's markup.
pub fn read_anchor(markup: &str) -> Result<Option<ListingLink>, RenderError> {
    let fragment = Html::parse_fragment(markup);
    let selector = parse_selector("[href]")?;
    let Some(anchor) = fragment.select(&selector).next() else {
        return Ok(None);
    };
    let href = anchor.value().attr("href").unwrap_or_default().trim().to_string();
    let title = anchor.text().collect::<String>().trim().to_string();
    if href.is_empty() || title.is_empty() {
        return Ok(None);
    }
    Ok(Some(ListingLink { title, href }))
}

enum PageResult {
    Anchors(Vec<ListingLink>),
    Failed(RenderError),
}

fn visit_page<R: Renderer>(
    renderer: &R,
    page: &R::Page,
    config: &DiscoveryConfig,
    sleeper: &dyn Sleeper,
) -> Result<PageResult, Interrupted> {
    sleeper.sleep(config.page_delay.sample())?;

    let elements = wait_for_min_links(renderer, page, &config.link_locator, config, sleeper)?;
    let mut anchors = Vec::with_capacity(elements.len());
    for element in &elements {
        let anchor = renderer
            .read_fragment(element)
            .and_then(|markup| read_anchor(&markup));
        match anchor {
            Ok(Some(anchor)) => anchors.push(anchor),
            Ok(None) => {}
            Err(e) => return Ok(PageResult::Failed(e)),
        }
    }
    Ok(PageResult::Anchors(anchors))
}

/// Crawl one category until the song cap, the page limit or an empty page.
pub fn discover_category<R: Renderer>(
    renderer: &mut R,
    genre_id: u32,
    name: &str,
    config: &DiscoveryConfig,
    sleeper: &dyn Sleeper,
) -> GenreCrawlState {
    let mut state = GenreCrawlState::new(genre_id, name);
    let pb = create_progress_bar(config.song_cap as u64, &format!("Discovering {name}"));

    while state.links.len() < config.song_cap && state.page < config.page_limit {
        state.page += 1;
        let url = config.page_url(genre_id, state.page);

        let tab = match renderer.open(&url) {
            Ok(tab) => tab,
            Err(e) => {
                state.failed_pages += 1;
                log_line(&pb, format!("[FAIL:transient] {url}: {e}"));
                if sleeper.sleep(config.between_pages_delay.sample()).is_err() {
                    pb.abandon();
                    return state;
                }
                continue;
            }
        };

        let visited = visit_page(renderer, &tab, config, sleeper);
        if let Err(e) = renderer.close(tab) {
            log_line(&pb, format!("[FAIL:release] {url}: {e}"));
        }

        match visited {
            Err(Interrupted) => {
                pb.abandon();
                return state;
            }
            Ok(PageResult::Failed(e)) => {
                state.failed_pages += 1;
                log_line(&pb, format!("[FAIL:transient] {url}: {e}"));
            }
            Ok(PageResult::Anchors(anchors)) if anchors.is_empty() => {
                log_line(&pb, format!("Page {}: no links, stopping {}", state.page, name));
                break;
            }
            Ok(PageResult::Anchors(anchors)) => {
                let found = anchors.len();
                let added = state.absorb(&url, anchors, config.song_cap);
                pb.set_position(state.links.len() as u64);
                log_line(
                    &pb,
                    format!("Page {}: {} anchors, {} new links", state.page, found, added),
                );
            }
        }

        if sleeper.sleep(config.between_pages_delay.sample()).is_err() {
            pb.abandon();
            return state;
        }
    }

    state.completed = true;
    pb.finish_with_message(format!("{}: {} links", name, state.links.len()));
    state
}

/// Crawl every configured category (or the named subset), one rendering
/// context per category, writing `<category>_links.json` after each.
pub fn run_discovery<L: Launcher>(
    launcher: &mut L,
    config: &DiscoveryConfig,
    layout: &DataLayout,
    only: &[String],
    sleeper: &dyn Sleeper,
) -> Result<Vec<GenreCrawlState>, ScrapeError> {
    let mut states = Vec::new();

    for (&genre_id, name) in &config.genres {
        if !only.is_empty() && !only.iter().any(|o| o.eq_ignore_ascii_case(name)) {
            continue;
        }

        let mut renderer = launcher.launch()?;
        let state = discover_category(&mut renderer, genre_id, name, config, sleeper);
        launcher.shutdown(renderer);

        let path = layout.category_links(name);
        write_json_atomic(&path, &state.links)?;
        eprintln!(
            "{} {} links for {} -> {}",
            if state.completed { "Saved" } else { "Saved partial" },
            state.links.len(),
            name,
            path.display()
        );

        let completed = state.completed;
        states.push(state);
        if !completed {
            break;
        }
    }

    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{StaticLauncher, StaticRenderer};
    use crate::store::read_json;
    use crate::testing::RecordingSleeper;
    use rustc_hash::FxHashMap;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn listing(songs: &[(&str, &str)]) -> String {
        let anchors: Vec<String> = songs
            .iter()
            .map(|(title, href)| format!("<a tabcount=\"1\" href=\"{href}\">{title}</a>"))
            .collect();
        format!("<html><body>{}</body></html>", anchors.join("\n"))
    }

    fn config() -> DiscoveryConfig {
        let mut genres = BTreeMap::new();
        genres.insert(4, "Rock".to_string());
        DiscoveryConfig {
            explore_url: "https://tabs.test/explore?genre={genre}&page={page}".to_string(),
            genres,
            song_cap: 10,
            page_limit: 5,
            min_links: 2,
            min_links_tolerance: 1,
            link_wait_timeout_ms: 1000,
            link_wait_interval_ms: 250,
            page_delay: crate::config::DelayRange::zero(),
            between_pages_delay: crate::config::DelayRange::zero(),
            ..DiscoveryConfig::default()
        }
    }

    fn pages(config: &DiscoveryConfig) -> FxHashMap<String, String> {
        let mut pages = FxHashMap::default();
        pages.insert(
            config.page_url(4, 1),
            listing(&[
                ("Wonderwall", "/tab/oasis/wonderwall-chords-1"),
                ("Wonderwall (ver 2)", "/tab/oasis/wonderwall-chords-2"),
                ("Creep", "/tab/radiohead/creep-chords-3"),
            ]),
        );
        pages.insert(
            config.page_url(4, 2),
            listing(&[
                ("Creep (Acoustic)", "/tab/radiohead/creep-chords-4"),
                ("Zombie", "/tab/cranberries/zombie-chords-5"),
            ]),
        );
        pages.insert(config.page_url(4, 3), listing(&[]));
        pages
    }

    #[test]
    fn test_read_anchor() {
        let anchor = read_anchor("<a tabcount=\"3\" href=\"/tab/x\"> Hey Jude </a>").unwrap();
        assert_eq!(
            anchor,
            Some(ListingLink {
                title: "Hey Jude".into(),
                href: "/tab/x".into()
            })
        );
        assert_eq!(read_anchor("<a tabcount=\"3\">no href</a>").unwrap(), None);
    }

    #[test]
    fn test_wait_accepts_tolerance_on_timeout() {
        let mut config = config();
        config.min_links = 3;
        let sleeper = RecordingSleeper::default();
        let renderer = StaticRenderer::new(Arc::new(FxHashMap::default()));
        let page = crate::render::HtmlDocument::parse(&listing(&[("A", "/a"), ("B", "/b")]));

        let found = wait_for_min_links(&renderer, &page, &config.link_locator, &config, &sleeper).unwrap();
        assert_eq!(found.len(), 2);
        // 4 attempts, 3 sleeps between them
        assert_eq!(sleeper.calls(), 3);

        config.min_links = 4;
        let found = wait_for_min_links(&renderer, &page, &config.link_locator, &config, &sleeper).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_wait_with_huge_timeout_keeps_waiting() {
        let mut config = config();
        config.min_links = 5;
        config.min_links_tolerance = 0;
        // 2^32 + 1 intervals, which a truncating cast turns into one attempt
        config.link_wait_timeout_ms = (1u64 << 32) + 1;
        config.link_wait_interval_ms = 1;
        let sleeper = RecordingSleeper::interrupting_after(3);
        let renderer = StaticRenderer::new(Arc::new(FxHashMap::default()));
        let page = crate::render::HtmlDocument::parse(&listing(&[("A", "/a")]));

        let waited = wait_for_min_links(&renderer, &page, &config.link_locator, &config, &sleeper);
        assert_eq!(waited.err(), Some(Interrupted));
        assert_eq!(sleeper.calls(), 3);
    }

    #[test]
    fn test_discover_dedups_titles_and_stops_on_empty_page() {
        let config = config();
        let sleeper = RecordingSleeper::default();
        let mut renderer = StaticRenderer::new(Arc::new(pages(&config)));

        let state = discover_category(&mut renderer, 4, "Rock", &config, &sleeper);

        assert!(state.completed);
        assert_eq!(state.page, 3);
        assert_eq!(
            state.links,
            vec![
                "https://tabs.test/tab/oasis/wonderwall-chords-1",
                "https://tabs.test/tab/radiohead/creep-chords-3",
                "https://tabs.test/tab/cranberries/zombie-chords-5",
            ]
        );
        assert_eq!(renderer.open_pages(), 0);
    }

    #[test]
    fn test_discover_respects_song_cap() {
        let mut config = config();
        config.song_cap = 2;
        let sleeper = RecordingSleeper::default();
        let mut renderer = StaticRenderer::new(Arc::new(pages(&config)));

        let state = discover_category(&mut renderer, 4, "Rock", &config, &sleeper);
        assert_eq!(state.links.len(), 2);
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_discover_counts_failed_pages_and_respects_limit() {
        let mut config = config();
        config.page_limit = 2;
        let sleeper = RecordingSleeper::default();
        let mut renderer = StaticRenderer::new(Arc::new(FxHashMap::default()));

        let state = discover_category(&mut renderer, 4, "Rock", &config, &sleeper);
        assert_eq!(state.failed_pages, 2);
        assert!(state.links.is_empty());
        assert!(state.completed);
    }

    #[test]
    fn test_run_discovery_writes_category_file() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let config = config();
        let sleeper = RecordingSleeper::default();
        let mut launcher = StaticLauncher::new(pages(&config));

        let states = run_discovery(&mut launcher, &config, &layout, &[], &sleeper).unwrap();
        assert_eq!(states.len(), 1);

        let saved: Vec<String> = read_json(&layout.category_links("Rock")).unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(launcher.launches(), 1);

        let skipped = run_discovery(&mut launcher, &config, &layout, &["Metal".to_string()], &sleeper).unwrap();
        assert!(skipped.is_empty());
    }
}
