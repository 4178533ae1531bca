//! Error taxonomy for the scraping pipeline.
//!
//! Per-item failures ([`FailureKind`]) are caught at the crawl session boundary
//! and only ever reach the log. Run-level failures ([`ScrapeError`]) abort the
//! current run and surface to the driver binaries.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of the rendering engine boundary.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to close page: {0}")]
    Close(String),

    #[error("invalid locator '{0}'")]
    InvalidLocator(String),

    #[error("failed to start rendering context: {0}")]
    Launch(String),
}

/// Why a single link could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// Page open/query failure or navigation timeout. The link is skipped.
    #[error("transient page error: {0}")]
    TransientPage(String),

    /// Unexpected structure while extracting. Recovered as an empty record.
    #[error("parse error: {0}")]
    Parse(String),

    /// The page could not be released. Logged, never retried.
    #[error("resource release error: {0}")]
    ResourceRelease(String),
}

impl FailureKind {
    /// Short tag used in per-item log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            FailureKind::TransientPage(_) => "transient",
            FailureKind::Parse(_) => "parse",
            FailureKind::ResourceRelease(_) => "release",
        }
    }
}

impl From<RenderError> for FailureKind {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Close(msg) => FailureKind::ResourceRelease(msg),
            other => FailureKind::TransientPage(other.to_string()),
        }
    }
}

/// Run-level failure. Any of these aborts the current run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("statistics requested over an empty dataset")]
    EmptyDataset,

    #[error(transparent)]
    Launch(#[from] RenderError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScrapeError {
    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        ScrapeError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn load(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        ScrapeError::Load {
            path: path.into(),
            source: source.into(),
        }
    }
}
