//! Page fetcher loop
//!
//! Walks the codes listing page by page under a page count and wall-clock
//! budget. Stop conditions are normal control flow; only real upstream
//! failures abort the build.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::CatalogError;
use super::flatten::{flatten_page, FlattenOptions};
use super::index::{CatalogIndex, CatalogRecord};
use crate::upstream::{CodesQuery, TariffUpstream};

/// Statuses the service uses past the last page
const END_OF_PAGES_STATUSES: [u16; 2] = [404, 422];

/// Why paging ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `page_limit` pages were requested
    PageLimit,
    /// The wall-clock budget ran out between pages
    TimeBudget,
    /// The service answered 404 or 422
    NoMorePages,
    /// A page parsed to zero records
    EmptyPage,
    /// The page matched the service's own last-page link
    LastPage,
}

/// Parameters of one build attempt
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub date: String,
    pub language: String,
    pub page_limit: u32,
    pub time_budget: Duration,
    pub breadcrumbs: bool,
}

/// Result of a completed page loop
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub index: CatalogIndex,

    /// Last page that contributed records
    pub last_page: Option<u32>,

    /// Upstream requests issued, including the one that ended paging
    pub pages_fetched: u32,

    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// Run the page loop and return a deduplicated catalog
///
/// Pages are requested from 1 upward and never retried. A page with zero
/// records ends paging even if later pages would have had some; the service
/// gives no guarantee either way, so this stays a heuristic.
pub async fn fetch_catalog(
    upstream: &dyn TariffUpstream,
    params: &BuildParams,
) -> Result<BuildOutcome, CatalogError> {
    let started = Instant::now();
    let page_limit = params.page_limit.max(1);
    let options = FlattenOptions {
        breadcrumbs: params.breadcrumbs,
        language: Some(params.language.clone()),
    };

    let mut records: Vec<CatalogRecord> = Vec::new();
    let mut last_page = None;
    let mut pages_fetched = 0;
    let mut stop_reason = StopReason::PageLimit;

    for page in 1..=page_limit {
        if started.elapsed() >= params.time_budget {
            debug!(
                "Time budget of {:?} spent before page {}",
                params.time_budget, page
            );
            stop_reason = StopReason::TimeBudget;
            break;
        }

        let query = CodesQuery {
            date: params.date.clone(),
            language: params.language.clone(),
            page,
        };

        pages_fetched += 1;
        let body = match upstream.fetch_codes_page(&query).await {
            Ok(body) => body,
            Err(err) if err.status().is_some_and(|s| END_OF_PAGES_STATUSES.contains(&s)) => {
                debug!("Page {} answered {}; no more pages", page, err);
                stop_reason = StopReason::NoMorePages;
                break;
            }
            Err(source) => return Err(CatalogError::Upstream { page, source }),
        };

        let flattened = flatten_page(&body, &options);
        if flattened.records.is_empty() {
            debug!("Page {} has no records; treating as end of data", page);
            stop_reason = StopReason::EmptyPage;
            break;
        }

        debug!("Page {}: {} records", page, flattened.records.len());
        records.extend(flattened.records);
        last_page = Some(page);

        if flattened.last_page.is_some_and(|last| page >= last) {
            stop_reason = StopReason::LastPage;
            break;
        }
    }

    let raw_count = records.len();
    let index = CatalogIndex::from_records(records);
    let elapsed = started.elapsed();

    info!(
        "Fetched {} records ({} unique) from {} page(s) in {:.2}s, stopped: {:?}",
        raw_count,
        index.len(),
        pages_fetched,
        elapsed.as_secs_f64(),
        stop_reason
    );

    Ok(BuildOutcome {
        index,
        last_page,
        pages_fetched,
        elapsed,
        stop_reason,
    })
}
