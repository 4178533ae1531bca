//! Fold result windows into the canonical dataset and compute statistics.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::ScrapeError;
use crate::models::{CanonicalDataset, ChordStats, ResultWindow, SongMap, WindowBounds};
use crate::progress::create_spinner;
use crate::store::{read_json, DataLayout};

#[derive(Debug, Default)]
pub struct MergeReport {
    pub dataset: CanonicalDataset,
    pub windows: usize,
    pub records_read: usize,
    /// Records dropped because they were empty or internally inconsistent
    pub dropped: Vec<String>,
}

/// Read window files in parallel. The result keeps the input order.
pub fn load_windows(files: &[(WindowBounds, PathBuf)]) -> Result<Vec<ResultWindow>, ScrapeError> {
    files
        .par_iter()
        .map(|(bounds, path)| {
            let records: SongMap = read_json(path)?;
            Ok(ResultWindow {
                bounds: *bounds,
                records,
            })
        })
        .collect()
}

/// Merge `windows` into `dataset` in order; later windows win on the
/// ordered fields, chord sets union.
pub fn merge_windows<I>(dataset: &mut CanonicalDataset, windows: I) -> (usize, Vec<String>)
where
    I: IntoIterator<Item = ResultWindow>,
{
    let mut read = 0;
    let mut dropped = Vec::new();
    for window in windows {
        for (link, record) in window.records {
            read += 1;
            if record.is_empty() || !record.is_consistent() {
                dropped.push(link);
                continue;
            }
            match dataset.get_mut(&link) {
                Some(existing) => existing.merge(record),
                None => {
                    dataset.insert(link, record);
                }
            }
        }
    }
    (read, dropped)
}

/// The stored canonical dataset with every window file folded in.
pub fn merge_layout(layout: &DataLayout) -> Result<MergeReport, ScrapeError> {
    let spinner = create_spinner("Merging result windows");

    let mut dataset = layout.read_canonical()?;
    let files = layout.window_files()?;
    let windows = load_windows(&files)?;
    let (records_read, dropped) = merge_windows(&mut dataset, windows);

    spinner.finish_with_message(format!(
        "Merged {} windows ({} records) into {} songs",
        files.len(),
        records_read,
        dataset.len()
    ));

    Ok(MergeReport {
        dataset,
        windows: files.len(),
        records_read,
        dropped,
    })
}

/// Aggregate statistics. Fails on an empty dataset rather than reporting
/// zeros for undefined means and extremes.
pub fn stats(dataset: &CanonicalDataset) -> Result<ChordStats, ScrapeError> {
    let counts: Vec<usize> = dataset.values().map(|r| r.chord_list.len()).collect();
    let (Some(&max_chords), Some(&min_chords)) = (counts.iter().max(), counts.iter().min()) else {
        return Err(ScrapeError::EmptyDataset);
    };

    let total: usize = counts.iter().sum();
    let mut chord_count_distribution = BTreeMap::new();
    for count in &counts {
        *chord_count_distribution.entry(*count).or_insert(0) += 1;
    }
    let unique_chord_vocabulary: BTreeSet<String> = dataset
        .values()
        .flat_map(|r| r.chord_set.iter().cloned())
        .collect();

    Ok(ChordStats {
        song_count: counts.len(),
        avg_chords_per_song: total as f64 / counts.len() as f64,
        max_chords,
        min_chords,
        chord_count_distribution,
        unique_chord_vocabulary,
    })
}
