//! HTTP facade over the tariff service and the code index
//!
//! | Route               | Backed by                                |
//! |---------------------|------------------------------------------|
//! | `/`                 | liveness                                 |
//! | `/measures`         | upstream measures, passed through        |
//! | `/search_codes`     | [`SearchEngine::search`]                 |
//! | `/rebuild_index`    | [`SearchEngine::rebuild`]                |
//! | `/index_status`     | [`SearchEngine::status`]                 |
//! | `/debug_codes_page` | one raw upstream codes page              |

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use isztar_core::catalog::normalize_lookup;
use isztar_core::config::LookupDefaults;
use isztar_core::upstream::{CodesQuery, MeasuresQuery};
use isztar_core::{
    BuildMetadata, CatalogError, SearchEngine, SearchRequest, SearchResponse, TariffUpstream,
};

use crate::error::{ApiError, ApiResult};

/// Shared state behind every handler
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub upstream: Arc<dyn TariffUpstream>,
    pub defaults: LookupDefaults,
}

impl AppState {
    /// Fill in defaults, then validate and normalize `date`/`language`
    fn lookup(
        &self,
        date: Option<String>,
        language: Option<String>,
    ) -> ApiResult<(String, String)> {
        let date = date.unwrap_or_else(|| self.defaults.date.clone());
        let language = language.unwrap_or_else(|| self.defaults.language.clone());
        Ok(normalize_lookup(&date, &language)?)
    }
}

#[derive(Debug, Deserialize)]
struct MeasuresParams {
    code: Option<String>,
    date: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    date: Option<String>,
    language: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RebuildParams {
    date: Option<String>,
    language: Option<String>,
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DebugPageParams {
    date: Option<String>,
    language: Option<String>,
    page: Option<u32>,
}

/// Body of `/rebuild_index`, on success and on failure
#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub meta: BuildMetadata,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/measures", get(measures))
        .route("/search_codes", get(search_codes))
        .route("/rebuild_index", get(rebuild_index))
        .route("/index_status", get(index_status))
        .route("/debug_codes_page", get(debug_codes_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;

    info!(
        "isztar listening on http://{} (upstream: {})",
        addr,
        state.upstream.name()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("isztar stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

async fn home() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn measures(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MeasuresParams>,
) -> ApiResult<Json<Value>> {
    let code = params
        .code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing required parameter: code"))?;
    let (date, language) = state.lookup(params.date, params.language)?;

    let payload = state
        .upstream
        .fetch_measures(&MeasuresQuery {
            code,
            date,
            language,
        })
        .await?;
    Ok(Json(payload))
}

async fn search_codes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let (date, language) = state.lookup(params.date, params.language)?;
    let request = SearchRequest {
        q: params.q.unwrap_or_default(),
        date,
        language,
        limit: params
            .limit
            .unwrap_or(state.engine.settings().default_search_limit),
    };

    Ok(Json(state.engine.search(&request).await?))
}

async fn rebuild_index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RebuildParams>,
) -> ApiResult<Response> {
    let (date, language) = state.lookup(params.date, params.language)?;

    let response = match state.engine.rebuild(&date, &language, params.pages).await {
        Ok(meta) => (
            StatusCode::OK,
            Json(RebuildResponse {
                ok: true,
                error: None,
                meta,
            }),
        )
            .into_response(),
        Err(err @ CatalogError::InvalidParameter { .. }) => return Err(err.into()),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RebuildResponse {
                ok: false,
                error: Some(err.render_chain()),
                meta: state.engine.status().await,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn index_status(State(state): State<Arc<AppState>>) -> Json<BuildMetadata> {
    Json(state.engine.status().await)
}

async fn debug_codes_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DebugPageParams>,
) -> ApiResult<Json<Value>> {
    let (date, language) = state.lookup(params.date, params.language)?;
    let page = state
        .upstream
        .fetch_codes_page(&CodesQuery {
            date,
            language,
            page: params.page.unwrap_or(1).max(1),
        })
        .await?;
    Ok(Json(page))
}
