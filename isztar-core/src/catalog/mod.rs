//! Nomenclature code catalog - index building and search
//!
//! This module keeps an in-memory, searchable copy of the tariff service's
//! nomenclature codes.
//!
//! # Architecture
//!
//! ```text
//! Tariff service (paged REST)
//!     │  GET codes?date&language&page
//!     ▼
//! fetcher   ← page loop: page/time budget, stop conditions
//!     │
//!     ├── flatten  ← one page body → CatalogRecord list
//!     ▼
//! index     ← dedup by code, build metadata
//!     │
//!     ▼
//! search    ← staleness check, build-then-swap, substring match
//! ```

mod error;
mod fetcher;
mod flatten;
mod index;
mod search;

pub use error::CatalogError;
pub use fetcher::{fetch_catalog, BuildOutcome, BuildParams, StopReason};
pub use flatten::{
    flatten_page, normalize_text, FlattenOptions, FlattenedPage, PageShape, BREADCRUMB_SEPARATOR,
};
pub use index::{BuildMetadata, CatalogIndex, CatalogRecord};
pub use search::{RefreshOutcome, SearchEngine, SearchRequest, SearchResponse};

/// Validate and normalize the `date`/`language` pair every lookup carries
///
/// Dates must be `YYYY-MM-DD`; languages are trimmed and upper-cased.
pub fn normalize_lookup(date: &str, language: &str) -> Result<(String, String), CatalogError> {
    let date = date.trim();
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        CatalogError::InvalidParameter {
            name: "date",
            message: format!("expected YYYY-MM-DD, got '{date}'"),
        }
    })?;

    let language = language.trim();
    if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CatalogError::InvalidParameter {
            name: "language",
            message: format!("expected a locale code such as PL, got '{language}'"),
        });
    }

    Ok((date.to_string(), language.to_ascii_uppercase()))
}
