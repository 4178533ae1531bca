//! Link set algebra: unify category lists, derive the work queue.
//!
//! There is no progress checkpoint. The work queue is always recomputed as
//! every known link minus the keys already present in the canonical dataset,
//! so rerunning after a crash picks up exactly where persisted results end.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::aggregate::merge_layout;
use crate::error::ScrapeError;
use crate::models::{CanonicalDataset, SongMap};
use crate::normalize::canonical_link;
use crate::store::{read_json, read_json_or_default, write_json_atomic, DataLayout};

/// Union of many link lists. Blank entries are dropped and fragments stripped.
pub fn unify<I, L, S>(lists: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lists
        .into_iter()
        .flatten()
        .filter_map(|link| canonical_link(link.as_ref()))
        .collect()
}

/// Links of `all` that have no record in `scraped`, in the order of `all`.
pub fn pending<'a, I>(all: I, scraped: &SongMap) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut queue = Vec::new();
    for link in all {
        if !scraped.contains_key(link) && seen.insert(link.as_str()) {
            queue.push(link.clone());
        }
    }
    queue
}

/// Union every category link file into `unique_links.json`.
pub fn unify_layout(layout: &DataLayout) -> Result<BTreeSet<String>, ScrapeError> {
    let mut lists = Vec::new();
    for path in layout.category_link_files()? {
        let links: Vec<String> = read_json(&path)?;
        eprintln!("  {}: {} links", path.display(), links.len());
        lists.push(links);
    }
    let unified = unify(lists);
    write_json_atomic(&layout.unique_links(), &unified)?;
    Ok(unified)
}

/// State of the data root after [`refresh_work_queue`].
#[derive(Debug)]
pub struct QueueRefresh {
    pub dataset: CanonicalDataset,
    pub known_links: usize,
    pub queue: Vec<String>,
}

/// Fold existing windows into `all_chords.json`, then write the links not
/// yet scraped to `unscraped_links.json`.
///
/// Folding first means windows from earlier runs are safe to overwrite
/// once the new queue is crawled from position zero.
pub fn refresh_work_queue(layout: &DataLayout) -> Result<QueueRefresh, ScrapeError> {
    let merged = merge_layout(layout)?;
    write_json_atomic(&layout.canonical_dataset(), &merged.dataset)?;

    let all: Vec<String> = read_json_or_default(&layout.unique_links())?;
    let queue = pending(&all, &merged.dataset);
    write_json_atomic(&layout.unscraped_links(), &queue)?;

    Ok(QueueRefresh {
        dataset: merged.dataset,
        known_links: all.len(),
        queue,
    })
}
