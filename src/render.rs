//! Rendering engine boundary.
//!
//! The scraping core only ever talks to a page through [`Renderer`]: open,
//! close, query, query-all and read-fragment. A [`Launcher`] owns the
//! lifecycle of one rendering context so the batch controller can rotate it
//! between windows.
//!
//! Two engines ship with the crate. [`StaticRenderer`] serves markup from
//! memory (offline replay and tests); [`HttpRenderer`] fetches
//! server-rendered markup over blocking HTTP. A live browser engine plugs in
//! by implementing the same two traits.

use rustc_hash::FxHashMap;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::RenderError;

// ============================================================================
// Locators
// ============================================================================

/// How to find an element on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    /// CSS selector
    Css(String),
    /// Element whose own text contains this string
    Text(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Locator::Text(needle.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::Text(s) => write!(f, "text:{:?}", s),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// One live rendering context (a browser, an HTTP client, ...).
pub trait Renderer {
    type Page;
    type Element;

    fn open(&mut self, url: &str) -> Result<Self::Page, RenderError>;

    fn close(&mut self, page: Self::Page) -> Result<(), RenderError>;

    fn query(&self, page: &Self::Page, locator: &Locator)
        -> Result<Option<Self::Element>, RenderError>;

    fn query_all(&self, page: &Self::Page, locator: &Locator)
        -> Result<Vec<Self::Element>, RenderError>;

    /// Current markup of an element (outer HTML).
    fn read_fragment(&self, element: &Self::Element) -> Result<String, RenderError>;
}

/// Starts and stops rendering contexts.
pub trait Launcher {
    type Renderer: Renderer;

    fn launch(&mut self) -> Result<Self::Renderer, RenderError>;

    fn shutdown(&mut self, renderer: Self::Renderer);
}

// ============================================================================
// Parsed documents
// ============================================================================

/// Markup captured from a page at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub markup: String,
}

/// A parsed page supporting [`Locator`] queries.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn select_first(&self, locator: &Locator) -> Result<Option<ElementSnapshot>, RenderError> {
        Ok(self.select_all(locator)?.into_iter().next())
    }

    pub fn select_all(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, RenderError> {
        let elements: Vec<ElementRef> = match locator {
            Locator::Css(css) => {
                let selector = parse_selector(css)?;
                self.html.select(&selector).collect()
            }
            // Innermost elements whose combined text holds the needle, so a
            // phrase split across inline tags still matches its container.
            Locator::Text(needle) => self
                .html
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| contains_text(*el, needle))
                .filter(|el| {
                    !el.children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| contains_text(child, needle))
                })
                .collect(),
        };

        Ok(elements
            .into_iter()
            .map(|el| ElementSnapshot { markup: el.html() })
            .collect())
    }
}

fn contains_text(element: ElementRef, needle: &str) -> bool {
    element.text().collect::<String>().contains(needle)
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, RenderError> {
    Selector::parse(css).map_err(|_| RenderError::InvalidLocator(css.to_string()))
}

// ============================================================================
// Static engine
// ============================================================================

/// Serves pre-rendered markup from memory. Unknown URLs fail to open.
pub struct StaticRenderer {
    pages: Arc<FxHashMap<String, String>>,
    open_pages: usize,
}

impl StaticRenderer {
    pub fn new(pages: Arc<FxHashMap<String, String>>) -> Self {
        Self {
            pages,
            open_pages: 0,
        }
    }

    /// Pages opened but not yet closed.
    pub fn open_pages(&self) -> usize {
        self.open_pages
    }
}

impl Renderer for StaticRenderer {
    type Page = HtmlDocument;
    type Element = ElementSnapshot;

    fn open(&mut self, url: &str) -> Result<HtmlDocument, RenderError> {
        let markup = self.pages.get(url).ok_or_else(|| RenderError::Open {
            url: url.to_string(),
            reason: "no such page".to_string(),
        })?;
        self.open_pages += 1;
        Ok(HtmlDocument::parse(markup))
    }

    fn close(&mut self, _page: HtmlDocument) -> Result<(), RenderError> {
        self.open_pages = self.open_pages.saturating_sub(1);
        Ok(())
    }

    fn query(&self, page: &HtmlDocument, locator: &Locator) -> Result<Option<ElementSnapshot>, RenderError> {
        page.select_first(locator)
    }

    fn query_all(&self, page: &HtmlDocument, locator: &Locator) -> Result<Vec<ElementSnapshot>, RenderError> {
        page.select_all(locator)
    }

    fn read_fragment(&self, element: &ElementSnapshot) -> Result<String, RenderError> {
        Ok(element.markup.clone())
    }
}

/// Launches [`StaticRenderer`]s over a shared page set.
#[derive(Default)]
pub struct StaticLauncher {
    pages: Arc<FxHashMap<String, String>>,
    launches: usize,
}

impl StaticLauncher {
    pub fn new(pages: FxHashMap<String, String>) -> Self {
        Self {
            pages: Arc::new(pages),
            launches: 0,
        }
    }

    pub fn launches(&self) -> usize {
        self.launches
    }
}

impl Launcher for StaticLauncher {
    type Renderer = StaticRenderer;

    fn launch(&mut self) -> Result<StaticRenderer, RenderError> {
        self.launches += 1;
        Ok(StaticRenderer::new(Arc::clone(&self.pages)))
    }

    fn shutdown(&mut self, _renderer: StaticRenderer) {}
}

// ============================================================================
// HTTP engine
// ============================================================================

/// Fetches server-rendered markup. Client-side rendering is not executed,
/// so this engine only suits pages whose chart is present in the response.
pub struct HttpRenderer {
    client: reqwest::blocking::Client,
}

impl Renderer for HttpRenderer {
    type Page = HtmlDocument;
    type Element = ElementSnapshot;

    fn open(&mut self, url: &str) -> Result<HtmlDocument, RenderError> {
        let open_err = |reason: String| RenderError::Open {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| open_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(open_err(format!("HTTP {}", status)));
        }
        let body = response.text().map_err(|e| open_err(e.to_string()))?;
        Ok(HtmlDocument::parse(&body))
    }

    fn close(&mut self, _page: HtmlDocument) -> Result<(), RenderError> {
        Ok(())
    }

    fn query(&self, page: &HtmlDocument, locator: &Locator) -> Result<Option<ElementSnapshot>, RenderError> {
        page.select_first(locator)
    }

    fn query_all(&self, page: &HtmlDocument, locator: &Locator) -> Result<Vec<ElementSnapshot>, RenderError> {
        page.select_all(locator)
    }

    fn read_fragment(&self, element: &ElementSnapshot) -> Result<String, RenderError> {
        Ok(element.markup.clone())
    }
}

/// Builds a fresh HTTP client (new connection pool, no carried-over state)
/// for every window.
pub struct HttpLauncher {
    user_agent: String,
    timeout: Duration,
}

impl HttpLauncher {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

impl Launcher for HttpLauncher {
    type Renderer = HttpRenderer;

    fn launch(&mut self) -> Result<HttpRenderer, RenderError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        Ok(HttpRenderer { client })
    }

    fn shutdown(&mut self, renderer: HttpRenderer) {
        drop(renderer);
    }
}
