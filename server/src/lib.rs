use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use retriever_core::persist::{load_or_build, IndexOrigin};
use retriever_core::{Hit, Retriever, RetrieverConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { retriever_core::config::MAX_RESULT_CEILING }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    /// Grouped, human-readable rendering consumed by the tool layer.
    pub output: String,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub section: String,
    pub score: f64,
    pub snippet: String,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    pub num_chunks: u32,
    pub num_terms: usize,
    pub skipped: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RetrieverConfig>,
    pub retriever: Arc<RwLock<Retriever>>,
    pub admin_token: Option<String>,
}

pub fn build_app(config: RetrieverConfig) -> Result<Router> {
    // Load the persisted index (building it once if absent) at startup
    let retriever = Retriever::open(&config, false)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app_state = AppState { config: Arc::new(config), retriever: Arc::new(RwLock::new(retriever)), admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    // Edge case: empty query yields an empty rendering
    if params.q.trim().is_empty() {
        let elapsed = start.elapsed();
        return Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: 0, output: String::new(), results: vec![] }));
    }

    // Snapshot the current index; a concurrent rebuild swaps in a new one without blocking us
    let retriever = state.retriever.read().clone();
    let (query, k) = (params.q.clone(), params.k);
    let (total_hits, output, hits) = tokio::task::spawn_blocking(move || {
        let ranked = retriever.rank(&query);
        let total_hits = ranked.iter().filter(|r| r.score > 0.0).count();
        (total_hits, retriever.format(&ranked, k), retriever.to_hits(&ranked, k))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let results = hits
        .into_iter()
        .map(|hit: Hit| SearchHit {
            snippet: highlight_terms(&hit.snippet, &raw_terms),
            filename: hit.filename,
            section: hit.section,
            score: hit.score,
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, took_s = elapsed.as_secs_f64(), "search served");
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, output, results }))
}

async fn rebuild_handler(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<RebuildResponse>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let config = state.config.clone();
    let outcome = tokio::task::spawn_blocking(move || load_or_build(&config, true))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let skipped = match &outcome.origin {
        IndexOrigin::Built { skipped } => skipped.iter().map(|s| format!("{}: {}", s.path.display(), s.reason)).collect(),
        IndexOrigin::Loaded => Vec::new(),
    };
    let response = RebuildResponse {
        num_chunks: outcome.index.document_count(),
        num_terms: outcome.index.document_frequency().len(),
        skipped,
    };
    *state.retriever.write() = Retriever::from_index(outcome.index, &state.config);
    tracing::info!(num_chunks = response.num_chunks, skipped = response.skipped.len(), "index rebuilt");
    Ok(Json(response))
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut escaped: Vec<String> = terms.iter().filter(|t| !t.trim().is_empty()).map(|t| regex::escape(t)).collect();
    if escaped.is_empty() {
        return snippet.to_string();
    }
    // longest first so "rust" wins over "r" at the same position
    escaped.sort_by(|a, b| b.len().cmp(&a.len()));
    escaped.dedup();
    let Ok(pat) = regex::RegexBuilder::new(&escaped.join("|")).case_insensitive(true).build() else {
        return snippet.to_string();
    };
    pat.replace_all(snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned()
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_case_insensitively() {
        let out = highlight_terms("Cache and cache", &["CACHE".to_string()]);
        assert_eq!(out, "<em>Cache</em> and <em>cache</em>");
    }

    #[test]
    fn later_terms_do_not_match_inserted_markup() {
        let terms = ["rust".to_string(), "em".to_string()];
        assert_eq!(highlight_terms("Rust is great", &terms), "<em>Rust</em> is great");
        assert_eq!(highlight_terms("Rust emits", &terms), "<em>Rust</em> <em>em</em>its");
    }

    #[test]
    fn overlapping_terms_prefer_the_longest() {
        let terms = ["r".to_string(), "rust".to_string(), "  ".to_string()];
        assert_eq!(highlight_terms("rust", &terms), "<em>rust</em>");
        assert_eq!(highlight_terms("plain", &[]), "plain");
    }
}
