//! Search engine - owns the held index and decides when to rebuild it
//!
//! The held index and its metadata sit behind one `RwLock`; the index itself
//! is an `Arc` that is replaced wholesale after a successful build, so readers
//! always search a complete snapshot. Builds are serialized by a separate
//! mutex so two stale searches never page the upstream twice.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::CatalogError;
use super::fetcher::{fetch_catalog, BuildParams};
use super::index::{BuildMetadata, CatalogIndex, CatalogRecord};
use super::normalize_lookup;
use crate::config::IndexSettings;
use crate::upstream::TariffUpstream;

/// A search over the held index
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    pub date: String,
    pub language: String,
    pub limit: usize,
}

/// Search results plus the metadata of the index they came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub items: Vec<CatalogRecord>,
    pub index_meta: BuildMetadata,
}

/// Result of a best-effort freshness check
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The held index already matches the request
    Fresh,
    /// A rebuild ran and its index is now held
    Rebuilt(BuildMetadata),
    /// A rebuild ran and failed; the previous index is still held
    Failed(CatalogError),
}

struct IndexState {
    catalog: Arc<CatalogIndex>,
    meta: BuildMetadata,
}

/// In-memory code index with lazy, parameter-keyed rebuilds
pub struct SearchEngine {
    upstream: Arc<dyn TariffUpstream>,
    settings: IndexSettings,
    state: RwLock<IndexState>,
    build_guard: Mutex<()>,
}

impl SearchEngine {
    /// Create an engine with an empty, never-built index
    pub fn new(upstream: Arc<dyn TariffUpstream>, settings: IndexSettings) -> Self {
        Self {
            upstream,
            settings,
            state: RwLock::new(IndexState {
                catalog: Arc::new(CatalogIndex::new()),
                meta: BuildMetadata::default(),
            }),
            build_guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Snapshot of the current build metadata
    pub async fn status(&self) -> BuildMetadata {
        self.state.read().await.meta.clone()
    }

    /// The index currently held
    pub async fn snapshot(&self) -> Arc<CatalogIndex> {
        Arc::clone(&self.state.read().await.catalog)
    }

    /// Whether a search for `date`/`language` would trigger a rebuild
    ///
    /// An invalid lookup can never be served, so it always counts as stale.
    pub async fn is_stale(&self, date: &str, language: &str) -> bool {
        match normalize_lookup(date, language) {
            Ok((date, language)) => self.is_stale_normalized(&date, &language).await,
            Err(_) => true,
        }
    }

    async fn is_stale_normalized(&self, date: &str, language: &str) -> bool {
        self.state.read().await.meta.is_stale_for(date, language)
    }

    /// Force a build, replacing the held index on success
    ///
    /// `pages` defaults to `default_rebuild_pages` and is clamped to
    /// `1..=max_page_limit`.
    pub async fn rebuild(
        &self,
        date: &str,
        language: &str,
        pages: Option<u32>,
    ) -> Result<BuildMetadata, CatalogError> {
        let (date, language) = normalize_lookup(date, language)?;
        let page_limit = self
            .settings
            .clamp_pages(pages.unwrap_or(self.settings.default_rebuild_pages));

        let _guard = self.build_guard.lock().await;
        self.run_build(&date, &language, page_limit).await
    }

    /// Rebuild with the implicit page limit if the index is stale
    ///
    /// Never fails: a failed rebuild is reported as [`RefreshOutcome::Failed`]
    /// and the previous index stays in place. An invalid `date`/`language` is
    /// reported the same way without touching the index.
    pub async fn ensure_fresh(&self, date: &str, language: &str) -> RefreshOutcome {
        match normalize_lookup(date, language) {
            Ok((date, language)) => self.refresh_normalized(&date, &language).await,
            Err(error) => RefreshOutcome::Failed(error),
        }
    }

    async fn refresh_normalized(&self, date: &str, language: &str) -> RefreshOutcome {
        if !self.is_stale_normalized(date, language).await {
            return RefreshOutcome::Fresh;
        }

        let _guard = self.build_guard.lock().await;

        // Another caller may have finished the same build while we waited
        if !self.is_stale_normalized(date, language).await {
            return RefreshOutcome::Fresh;
        }

        let page_limit = self.settings.clamp_pages(self.settings.implicit_page_limit);
        match self.run_build(date, language, page_limit).await {
            Ok(meta) => RefreshOutcome::Rebuilt(meta),
            Err(error) => {
                warn!(
                    "Implicit index rebuild failed, searching the held index: {}",
                    error.render_chain()
                );
                RefreshOutcome::Failed(error)
            }
        }
    }

    /// Answer a search, rebuilding first if the index is stale
    ///
    /// Only an invalid `date`/`language` is an error; a failed implicit
    /// rebuild still answers from the held index.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, CatalogError> {
        let (date, language) = normalize_lookup(&request.date, &request.language)?;

        if let RefreshOutcome::Rebuilt(meta) = self.refresh_normalized(&date, &language).await {
            debug!("Index rebuilt before search: {} records", meta.count);
        }

        let (catalog, index_meta) = {
            let state = self.state.read().await;
            (Arc::clone(&state.catalog), state.meta.clone())
        };

        let items = catalog.search(&request.q, request.limit);
        debug!(
            "Search {:?}: {} of {} records matched",
            request.q,
            items.len(),
            catalog.len()
        );

        Ok(SearchResponse {
            query: request.q.clone(),
            count: items.len(),
            items,
            index_meta,
        })
    }

    /// One build attempt; callers hold `build_guard`
    async fn run_build(
        &self,
        date: &str,
        language: &str,
        page_limit: u32,
    ) -> Result<BuildMetadata, CatalogError> {
        self.state
            .write()
            .await
            .meta
            .begin(date, language, page_limit);

        info!(
            "Building code index from {} (date={}, language={}, pages<={})",
            self.upstream.name(),
            date,
            language,
            page_limit
        );

        let params = BuildParams {
            date: date.to_string(),
            language: language.to_string(),
            page_limit,
            time_budget: self.settings.time_budget(),
            breadcrumbs: self.settings.breadcrumbs,
        };

        let started = Instant::now();
        let result = fetch_catalog(self.upstream.as_ref(), &params).await;

        let mut state = self.state.write().await;
        match result {
            Ok(outcome) => {
                state.meta.finish_success(&outcome);
                state.catalog = Arc::new(outcome.index);
                Ok(state.meta.clone())
            }
            Err(error) => {
                let held = state.catalog.len();
                state.meta.finish_failure(&error, started.elapsed(), held);
                Err(error)
            }
        }
    }
}
