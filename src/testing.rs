//! Test doubles shared by the unit tests.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::Duration;

use crate::error::RenderError;
use crate::render::{ElementSnapshot, HtmlDocument, Locator, Renderer, StaticRenderer};
use crate::shutdown::{Interrupted, Sleeper};

/// Records requested sleeps without blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
    interrupt_after: Option<usize>,
}

impl RecordingSleeper {
    /// The first `n` sleeps succeed, every later one is interrupted.
    pub fn interrupting_after(n: usize) -> Self {
        Self {
            slept: RefCell::new(Vec::new()),
            interrupt_after: Some(n),
        }
    }

    pub fn calls(&self) -> usize {
        self.slept.borrow().len()
    }

    pub fn total(&self) -> Duration {
        self.slept.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.interrupt_after.is_some_and(|n| self.calls() >= n) {
            return Err(Interrupted);
        }
        self.slept.borrow_mut().push(duration);
        Ok(())
    }
}

/// Serves a scripted sequence of reads for CSS locators; text locators
/// (removal notices) match once `negative_from` CSS queries have been made.
pub struct ScriptedRenderer {
    reads: Vec<Option<String>>,
    cursor: Cell<usize>,
    negative_from: Option<usize>,
}

impl ScriptedRenderer {
    pub fn new(reads: Vec<Option<&str>>) -> Self {
        Self {
            reads: reads.into_iter().map(|r| r.map(str::to_string)).collect(),
            cursor: Cell::new(0),
            negative_from: None,
        }
    }

    pub fn with_negative_from(mut self, main_queries: usize) -> Self {
        self.negative_from = Some(main_queries);
        self
    }

    pub fn main_queries(&self) -> usize {
        self.cursor.get()
    }
}

impl Renderer for ScriptedRenderer {
    type Page = ();
    type Element = String;

    fn open(&mut self, _url: &str) -> Result<(), RenderError> {
        Ok(())
    }

    fn close(&mut self, _page: ()) -> Result<(), RenderError> {
        Ok(())
    }

    fn query(&self, _page: &(), locator: &Locator) -> Result<Option<String>, RenderError> {
        match locator {
            Locator::Css(_) => {
                let i = self.cursor.get();
                self.cursor.set(i + 1);
                Ok(self.reads.get(i).cloned().flatten())
            }
            Locator::Text(needle) => Ok(self
                .negative_from
                .filter(|&n| self.cursor.get() >= n)
                .map(|_| needle.clone())),
        }
    }

    fn query_all(&self, page: &(), locator: &Locator) -> Result<Vec<String>, RenderError> {
        Ok(self.query(page, locator)?.into_iter().collect())
    }

    fn read_fragment(&self, element: &String) -> Result<String, RenderError> {
        Ok(element.clone())
    }
}

/// [`StaticRenderer`] with failure injection per URL.
pub struct FlakyRenderer {
    inner: StaticRenderer,
    fail_open: FxHashSet<String>,
    fail_close: FxHashSet<String>,
    fail_query: FxHashSet<String>,
    pub closed: Vec<String>,
}

impl FlakyRenderer {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        let pages: FxHashMap<String, String> = pages
            .iter()
            .map(|(url, html)| (url.to_string(), html.to_string()))
            .collect();
        Self {
            inner: StaticRenderer::new(Arc::new(pages)),
            fail_open: FxHashSet::default(),
            fail_close: FxHashSet::default(),
            fail_query: FxHashSet::default(),
            closed: Vec::new(),
        }
    }

    pub fn failing_open(mut self, url: &str) -> Self {
        self.fail_open.insert(url.to_string());
        self
    }

    pub fn failing_close(mut self, url: &str) -> Self {
        self.fail_close.insert(url.to_string());
        self
    }

    pub fn failing_query(mut self, url: &str) -> Self {
        self.fail_query.insert(url.to_string());
        self
    }

    pub fn open_pages(&self) -> usize {
        self.inner.open_pages()
    }
}

impl Renderer for FlakyRenderer {
    type Page = (String, HtmlDocument);
    type Element = ElementSnapshot;

    fn open(&mut self, url: &str) -> Result<Self::Page, RenderError> {
        if self.fail_open.contains(url) {
            return Err(RenderError::Open {
                url: url.to_string(),
                reason: "navigation timeout".to_string(),
            });
        }
        Ok((url.to_string(), self.inner.open(url)?))
    }

    fn close(&mut self, (url, doc): Self::Page) -> Result<(), RenderError> {
        self.inner.close(doc)?;
        self.closed.push(url.clone());
        if self.fail_close.contains(&url) {
            return Err(RenderError::Close(format!("target closed: {url}")));
        }
        Ok(())
    }

    fn query(&self, (url, doc): &Self::Page, locator: &Locator) -> Result<Option<ElementSnapshot>, RenderError> {
        if self.fail_query.contains(url) {
            return Err(RenderError::Query("execution context destroyed".to_string()));
        }
        self.inner.query(doc, locator)
    }

    fn query_all(&self, (url, doc): &Self::Page, locator: &Locator) -> Result<Vec<ElementSnapshot>, RenderError> {
        if self.fail_query.contains(url) {
            return Err(RenderError::Query("execution context destroyed".to_string()));
        }
        self.inner.query_all(doc, locator)
    }

    fn read_fragment(&self, element: &ElementSnapshot) -> Result<String, RenderError> {
        self.inner.read_fragment(element)
    }
}
