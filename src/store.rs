//! On-disk layout and JSON persistence.
//!
//! All files are UTF-8, pretty-printed JSON at fixed paths under a data
//! root. Writes go to a temporary sibling file that is renamed over the
//! target, so a crash never leaves a half-written window or dataset.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ScrapeError;
use crate::models::{CanonicalDataset, ResultWindow, WindowBounds};

const SCRAPED_DIR: &str = "scraped_data";
const CHORDS_DIR: &str = "all_chords";
const UNIQUE_LINKS: &str = "unique_links.json";
const UNSCRAPED_LINKS: &str = "unscraped_links.json";
const CANONICAL_DATASET: &str = "all_chords.json";
const CATEGORY_SUFFIX: &str = "_links.json";

/// Well-known paths relative to a data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scraped_dir(&self) -> PathBuf {
        self.root.join(SCRAPED_DIR)
    }

    pub fn chords_dir(&self) -> PathBuf {
        self.root.join(CHORDS_DIR)
    }

    /// `scraped_data/unique_links.json`: every known link
    pub fn unique_links(&self) -> PathBuf {
        self.scraped_dir().join(UNIQUE_LINKS)
    }

    /// `scraped_data/unscraped_links.json`: the current work queue
    pub fn unscraped_links(&self) -> PathBuf {
        self.scraped_dir().join(UNSCRAPED_LINKS)
    }

    /// `scraped_data/<category>_links.json`
    pub fn category_links(&self, category: &str) -> PathBuf {
        let slug = category.to_lowercase().replace(['-', ' '], "");
        self.scraped_dir().join(format!("{}{}", slug, CATEGORY_SUFFIX))
    }

    /// `all_chords/chord_sections_<first>_<last>.json`
    pub fn window_file(&self, bounds: WindowBounds) -> PathBuf {
        self.chords_dir().join(bounds.file_name())
    }

    /// `all_chords/all_chords.json`
    pub fn canonical_dataset(&self) -> PathBuf {
        self.chords_dir().join(CANONICAL_DATASET)
    }

    /// Per-category link files. The unified set and the work queue share the
    /// suffix and are excluded.
    pub fn category_link_files(&self) -> Result<Vec<PathBuf>, ScrapeError> {
        let dir = self.scraped_dir();
        let mut files: Vec<PathBuf> = list_dir(&dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| {
                        name.ends_with(CATEGORY_SUFFIX)
                            && name != UNIQUE_LINKS
                            && name != UNSCRAPED_LINKS
                    })
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Window files with their bounds, ordered by `(first, last)`.
    pub fn window_files(&self) -> Result<Vec<(WindowBounds, PathBuf)>, ScrapeError> {
        let mut windows: Vec<(WindowBounds, PathBuf)> = list_dir(&self.chords_dir())?
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                Some((WindowBounds::parse_file_name(name)?, path))
            })
            .collect();
        windows.sort();
        Ok(windows)
    }

    pub fn write_window(&self, window: &ResultWindow) -> Result<PathBuf, ScrapeError> {
        let path = self.window_file(window.bounds);
        write_json_atomic(&path, &window.records)?;
        Ok(path)
    }

    /// The canonical dataset, empty if it has never been written.
    pub fn read_canonical(&self) -> Result<CanonicalDataset, ScrapeError> {
        read_json_or_default(&self.canonical_dataset())
    }
}

/// Files in `dir`; a missing directory reads as empty.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, ScrapeError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ScrapeError::load(dir, e)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScrapeError::load(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ScrapeError> {
    let text = fs::read_to_string(path).map_err(|e| ScrapeError::load(path, e))?;
    serde_json::from_str(&text).map_err(|e| ScrapeError::load(path, e))
}

/// Like [`read_json`], but a missing file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ScrapeError> {
    if !path.exists() {
        return Ok(T::default());
    }
    read_json(path)
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ScrapeError> {
    let fail = |e: io::Error| ScrapeError::persistence(path, e);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| fail(e.into()))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp).map_err(fail)?;
    file.write_all(json.as_bytes()).map_err(fail)?;
    file.write_all(b"\n").map_err(fail)?;
    file.sync_all().map_err(fail)?;
    drop(file);

    fs::rename(&tmp, path).map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SongMap, SongRecord};
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("/data");
        assert_eq!(layout.unique_links(), PathBuf::from("/data/scraped_data/unique_links.json"));
        assert_eq!(layout.unscraped_links(), PathBuf::from("/data/scraped_data/unscraped_links.json"));
        assert_eq!(layout.canonical_dataset(), PathBuf::from("/data/all_chords/all_chords.json"));
        assert_eq!(
            layout.window_file(WindowBounds::new(0, 200)),
            PathBuf::from("/data/all_chords/chord_sections_0_200.json")
        );
        assert_eq!(layout.category_links("RnB"), PathBuf::from("/data/scraped_data/rnb_links.json"));
    }

    #[test]
    fn test_atomic_write_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/links.json");
        let links = vec!["https://a".to_string(), "https://b".to_string()];

        write_json_atomic(&path, &links).unwrap();
        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, links);
        assert!(!dir.path().join("nested/links.json.tmp").exists());
    }

    #[test]
    fn test_missing_optional_file_is_default() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        assert!(layout.read_canonical().unwrap().is_empty());
        assert!(layout.window_files().unwrap().is_empty());
        assert!(layout.category_link_files().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_json::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, ScrapeError::Load { .. }));
    }

    #[test]
    fn test_category_files_exclude_unified_and_queue() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        for name in ["rock_links.json", "pop_links.json", "unique_links.json", "unscraped_links.json", "notes.txt"] {
            write_json_atomic(&layout.scraped_dir().join(name), &Vec::<String>::new()).unwrap();
        }
        let names: Vec<String> = layout
            .category_link_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pop_links.json", "rock_links.json"]);
    }

    #[test]
    fn test_window_files_sorted_by_bounds() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let mut records = SongMap::new();
        records.insert("https://x".into(), SongRecord::from_chords(vec!["C".into()]));
        for (first, last) in [(200, 400), (0, 200), (400, 450)] {
            layout
                .write_window(&ResultWindow {
                    bounds: WindowBounds::new(first, last),
                    records: records.clone(),
                })
                .unwrap();
        }
        write_json_atomic(&layout.canonical_dataset(), &records).unwrap();

        let bounds: Vec<WindowBounds> = layout.window_files().unwrap().into_iter().map(|(b, _)| b).collect();
        assert_eq!(
            bounds,
            vec![WindowBounds::new(0, 200), WindowBounds::new(200, 400), WindowBounds::new(400, 450)]
        );
    }
}
