//! Chord chart scraping library - shared modules for all binaries.
//!
//! Pipeline: `discover-links` crawls category listings, `unify-links`
//! merges them into one link set, `scrape-chords` crawls the links not yet
//! in the dataset window by window, and `merge-chords` folds the windows
//! into `all_chords.json` and reports statistics.

pub mod aggregate;
pub mod batch;
pub mod chords;
pub mod config;
pub mod discovery;
pub mod error;
pub mod links;
pub mod models;
pub mod normalize;
pub mod poller;
pub mod progress;
pub mod render;
pub mod safety;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod validity;

#[cfg(test)]
mod testing;
