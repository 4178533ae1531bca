//! Page-level "content unusable" check.
//!
//! The same marker list serves two call sites: [`ValidityClassifier::is_valid`]
//! runs once before extraction, and [`ValidityClassifier::markers`] is handed
//! to the stability poller as its negative locators, so a removal notice that
//! renders late still stops the wait.

use crate::error::RenderError;
use crate::render::{Locator, Renderer};

#[derive(Debug, Clone)]
pub struct ValidityClassifier {
    markers: Vec<Locator>,
}

impl ValidityClassifier {
    pub fn new(markers: Vec<Locator>) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &[Locator] {
        &self.markers
    }

    /// False when any removal/licensing marker is present on the page.
    pub fn is_valid<R: Renderer>(&self, renderer: &R, page: &R::Page) -> Result<bool, RenderError> {
        for marker in &self.markers {
            if renderer.query(page, marker)?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
