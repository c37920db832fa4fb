//! isztar core library
//!
//! Index builder and search engine over the ISZTAR tariff service's
//! nomenclature codes, plus the upstream client the HTTP facade forwards to.

pub mod catalog;
pub mod config;
pub mod upstream;

pub use catalog::{
    BuildMetadata, CatalogError, CatalogIndex, CatalogRecord, RefreshOutcome, SearchEngine,
    SearchRequest, SearchResponse,
};
pub use config::ServiceConfig;
pub use upstream::{HttpUpstream, TariffUpstream, UpstreamError};
