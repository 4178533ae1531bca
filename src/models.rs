//! Core data models for chord scraping.
//!
//! This module contains the durable record types written to disk, the
//! window bookkeeping used by the batch controller, and the aggregate
//! statistics derived from the canonical dataset.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Type Aliases
// ============================================================================

/// Section label -> chords in that section. Insertion order is the song order.
pub type Sections = IndexMap<String, Vec<String>>;

/// Link -> record. Used for both result windows and the canonical dataset.
pub type SongMap = BTreeMap<String, SongRecord>;

/// The union-with-merge of every result window ever produced.
pub type CanonicalDataset = SongMap;

/// Label for chords that appear before the first section header.
pub const UNNAMED_SECTION: &str = "Unnamed Section";

/// Label for a header with nothing between the brackets (`[]`).
pub const BLANK_SECTION: &str = "Blank Section";

// ============================================================================
// Song Records
// ============================================================================

/// Chords extracted from one song's chart. Keyed by link in every map.
///
/// ## Invariants
///
/// - `count == chord_list.len()`
/// - `chord_set == set(chord_list)` for every record built by the parser
/// - when `sections` is present, concatenating its values in order
///   reproduces `chord_list`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub chord_list: Vec<String>,
    pub chord_set: BTreeSet<String>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Sections>,
}

impl SongRecord {
    /// The canonical empty shape: no chords, no sections.
    pub fn empty() -> Self {
        Self {
            chord_list: Vec::new(),
            chord_set: BTreeSet::new(),
            count: 0,
            sections: None,
        }
    }

    pub fn from_chords(chord_list: Vec<String>) -> Self {
        let chord_set = chord_list.iter().cloned().collect();
        let count = chord_list.len();
        Self {
            chord_list,
            chord_set,
            count,
            sections: None,
        }
    }

    /// Build a record from labelled sections. Sections without chords are
    /// dropped; the chord list is the concatenation of what remains.
    pub fn from_sections(sections: Sections) -> Self {
        let sections: Sections = sections
            .into_iter()
            .filter(|(_, chords)| !chords.is_empty())
            .collect();
        let chord_list: Vec<String> = sections.values().flatten().cloned().collect();
        let mut record = Self::from_chords(chord_list);
        if !sections.is_empty() {
            record.sections = Some(sections);
        }
        record
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check the structural invariants. Records read back from disk are
    /// validated with this before they are merged.
    pub fn is_consistent(&self) -> bool {
        if self.count != self.chord_list.len() {
            return false;
        }
        if !self.chord_list.iter().all(|c| self.chord_set.contains(c)) {
            return false;
        }
        match &self.sections {
            None => true,
            Some(sections) => sections
                .values()
                .flatten()
                .eq(self.chord_list.iter()),
        }
    }

    /// Fold a newer observation of the same link into this record.
    ///
    /// The ordered data (`chord_list`, `count`, `sections`) is taken from the
    /// newer record as a unit. `chord_set` is the union of both, so vocabulary
    /// seen in an earlier scrape is never dropped. Sections from the older
    /// record survive only if the newer one has none and they still describe
    /// the newer chord list.
    pub fn merge(&mut self, newer: SongRecord) {
        let keep_sections = newer.sections.is_none()
            && self.chord_list == newer.chord_list
            && self.sections.is_some();
        let old_sections = self.sections.take();

        self.chord_set.extend(newer.chord_set);
        self.chord_list = newer.chord_list;
        self.count = newer.count;
        self.sections = if keep_sections {
            old_sections
        } else {
            newer.sections
        };
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Half-open slice `[first, last)` of the work queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowBounds {
    pub first: usize,
    pub last: usize,
}

impl WindowBounds {
    const PREFIX: &'static str = "chord_sections_";
    const SUFFIX: &'static str = ".json";

    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    pub fn len(&self) -> usize {
        self.last.saturating_sub(self.first)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `chord_sections_<first>_<last>.json`
    pub fn file_name(&self) -> String {
        format!("{}{}_{}{}", Self::PREFIX, self.first, self.last, Self::SUFFIX)
    }

    /// Inverse of [`WindowBounds::file_name`]. Returns `None` for any other file.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let inner = name.strip_prefix(Self::PREFIX)?.strip_suffix(Self::SUFFIX)?;
        let (first, last) = inner.split_once('_')?;
        let first = first.parse().ok()?;
        let last = last.parse().ok()?;
        (first <= last).then_some(Self { first, last })
    }

    /// Partition `len` items into contiguous windows of `size`; the last
    /// window may be shorter.
    pub fn partition(len: usize, size: usize) -> Vec<WindowBounds> {
        assert!(size > 0, "window size must be positive");
        (0..len)
            .step_by(size)
            .map(|first| WindowBounds::new(first, (first + size).min(len)))
            .collect()
    }
}

impl std::fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.first, self.last)
    }
}

/// Results of one batch window. Immutable once persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultWindow {
    pub bounds: WindowBounds,
    pub records: SongMap,
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate statistics over a canonical dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordStats {
    pub song_count: usize,
    pub avg_chords_per_song: f64,
    pub max_chords: usize,
    pub min_chords: usize,
    /// Chord count -> number of songs with that many chords
    pub chord_count_distribution: BTreeMap<usize, usize>,
    pub unique_chord_vocabulary: BTreeSet<String>,
}

impl ChordStats {
    pub fn vocabulary_size(&self) -> usize {
        self.unique_chord_vocabulary.len()
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
