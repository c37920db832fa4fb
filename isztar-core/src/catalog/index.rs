//! Catalog index and build metadata
//!
//! The index is the flat, deduplicated list of nomenclature codes produced by
//! the last successful build. It is never patched in place: every build
//! produces a new index that replaces the old one as a whole.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::CatalogError;
use super::fetcher::{BuildOutcome, StopReason};
use super::flatten::normalize_text;

/// One searchable nomenclature code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Nomenclature code, e.g. "0101"
    pub code: String,

    /// Description, optionally prefixed with its ancestors ("LIVE ANIMALS > Horses")
    pub description: String,
}

impl CatalogRecord {
    /// Build a record from raw text, or `None` if either part is blank
    pub fn new(code: &str, description: &str) -> Option<Self> {
        let code = normalize_text(code);
        let description = normalize_text(description);

        if code.is_empty() || description.is_empty() {
            return None;
        }

        Some(Self { code, description })
    }
}

#[derive(Debug, Clone)]
struct IndexedRecord {
    record: CatalogRecord,
    /// Case-folded description used for matching
    folded: String,
}

/// Ordered catalog of records, unique by code
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: IndexMap<String, IndexedRecord>,
}

impl CatalogIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from records in traversal order
    ///
    /// A code seen again replaces the earlier description (last wins) but
    /// keeps the position where the code first appeared.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CatalogRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&mut self, record: CatalogRecord) -> Option<CatalogRecord> {
        let folded = fold_case(&record.description);
        self.entries
            .insert(record.code.clone(), IndexedRecord { record, folded })
            .map(|previous| previous.record)
    }

    /// Look up a record by code
    pub fn get(&self, code: &str) -> Option<&CatalogRecord> {
        self.entries.get(code).map(|entry| &entry.record)
    }

    /// Iterate records in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.entries.values().map(|entry| &entry.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Search descriptions by query string
    ///
    /// Case-insensitive substring match against the description only (never
    /// the code). Results keep catalog order and are cut at `limit`, which is
    /// treated as at least 1. An empty query matches every record.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CatalogRecord> {
        let needle = fold_case(&normalize_text(query));

        self.entries
            .values()
            .filter(|entry| entry.folded.contains(&needle))
            .take(limit.max(1))
            .map(|entry| entry.record.clone())
            .collect()
    }
}

/// Provenance of the index currently held
///
/// Reset at the start of every build attempt and finalized at its end,
/// whether the attempt succeeded or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub built: bool,
    pub count: usize,
    pub last_build_seconds: Option<f64>,
    pub last_page: Option<u32>,
    pub date: Option<String>,
    pub language: Option<String>,
    pub last_error: Option<String>,

    /// Page limit the last attempt ran with
    pub page_limit: Option<u32>,

    /// Upstream requests issued by the last attempt
    pub pages_fetched: u32,

    /// Why the last successful attempt stopped paging
    pub stop_reason: Option<StopReason>,

    /// When the last attempt finished (RFC 3339)
    pub built_at: Option<String>,
}

impl BuildMetadata {
    /// Whether an index described by this metadata can answer for `date`/`language`
    pub fn is_stale_for(&self, date: &str, language: &str) -> bool {
        !self.built
            || self.date.as_deref() != Some(date)
            || self.language.as_deref() != Some(language)
    }

    /// Reset at the start of a build attempt
    pub fn begin(&mut self, date: &str, language: &str, page_limit: u32) {
        self.built = false;
        self.last_error = None;
        self.date = Some(date.to_string());
        self.language = Some(language.to_string());
        self.page_limit = Some(page_limit);
    }

    /// Finalize after a successful build
    pub fn finish_success(&mut self, outcome: &BuildOutcome) {
        self.built = true;
        self.count = outcome.index.len();
        self.last_build_seconds = Some(round_seconds(outcome.elapsed));
        self.last_page = outcome.last_page;
        self.pages_fetched = outcome.pages_fetched;
        self.stop_reason = Some(outcome.stop_reason);
        self.last_error = None;
        self.built_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Finalize after a failed build; `held_count` is the size of the index kept
    pub fn finish_failure(&mut self, error: &CatalogError, elapsed: Duration, held_count: usize) {
        self.built = false;
        self.count = held_count;
        self.last_build_seconds = Some(round_seconds(elapsed));
        self.last_page = None;
        self.pages_fetched = match error {
            CatalogError::Upstream { page, .. } => *page,
            CatalogError::InvalidParameter { .. } => 0,
        };
        self.stop_reason = None;
        self.last_error = Some(error.render_chain());
        self.built_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// Lowercase one char at a time so folding never depends on context
///
/// `str::to_lowercase` maps a word-final `Σ` to `ς` but a lone one to `σ`;
/// both become `σ` here.
pub(crate) fn fold_case(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'ς' { 'σ' } else { c })
        .collect()
}

/// Seconds rounded to two decimals
pub(crate) fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
