use std::future::Future;
use std::sync::{Arc, OnceLock};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sentiment_core::{AnalysisResult, BatchStatistics, Language, SentimentService};
use sentiment_history::{HistoryQuery, HistoryStore, DEFAULT_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod auth;
mod error;
mod requests;

pub use auth::{ApiAuth, API_KEY_HEADER};
pub use error::ApiError;
pub use requests::{AnalyzeBody, BatchBody};

pub const API_VERSION: &str = "1.0.0";
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: SentimentService,
    history: Arc<HistoryStore>,
    metrics: PrometheusHandle,
}

fn init_metrics_recorder() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(err) => {
                // Another recorder owns the process; keep serving an empty exposition.
                tracing::warn!(error = %err, "prometheus recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<AnalysisResult>,
    pub statistics: BatchStatistics,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sentiment: Option<String>,
}

impl HistoryParams {
    /// Unparseable numbers fall back to their defaults; an empty filter means none.
    fn into_query(self) -> HistoryQuery {
        HistoryQuery {
            limit: parse_or(self.limit, DEFAULT_PAGE_LIMIT),
            offset: parse_or(self.offset, 0),
            sentiment: self.sentiment.filter(|s| !s.trim().is_empty()),
        }
    }
}

fn parse_or(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

/// Builds the router with advisory authentication and no known keys.
pub fn build_router(service: SentimentService, history: Arc<HistoryStore>) -> Router {
    build_router_with_auth(service, history, ApiAuth::new())
}

/// Builds the router. Successful analyses are recorded in `history`.
pub fn build_router_with_auth(
    service: SentimentService,
    history: Arc<HistoryStore>,
    auth: ApiAuth,
) -> Router {
    let metrics = init_metrics_recorder();
    let state = AppState {
        service: service.with_history(history.clone()),
        history,
        metrics,
    };

    let api = Router::new()
        .route("/analyze", post(analyze))
        .route("/batch", post(batch_analyze))
        .route("/history", get(history_page))
        .route("/stats", get(statistics))
        .route("/export", get(export_history))
        .route_layer(middleware::from_fn_with_state(auth, auth::require_api_key));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    listener: TcpListener,
    service: SentimentService,
    history: Arc<HistoryStore>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> JoinHandle<Result<(), std::io::Error>> {
    start_server_with_auth(listener, service, history, ApiAuth::new(), shutdown).await
}

pub async fn start_server_with_auth(
    listener: TcpListener,
    service: SentimentService,
    history: Arc<HistoryStore>,
    auth: ApiAuth,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> JoinHandle<Result<(), std::io::Error>> {
    let app = build_router_with_auth(service, history, auth);
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    })
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Sentiment Analysis API",
        "version": API_VERSION,
        "description": "REST API for text sentiment analysis with multi-language model routing",
        "endpoints": {
            "/health": {
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            "/metrics": {
                "method": "GET",
                "description": "Prometheus metrics",
                "authentication": "None"
            },
            "/api/analyze": {
                "method": "POST",
                "description": "Analyze sentiment of a single text",
                "authentication": "Optional (X-API-Key header)",
                "request_body": {
                    "text": "string (required)",
                    "language": "string (optional, default: en)",
                    "save_history": "boolean (optional, default: true)"
                },
                "example": {"text": "I love this product!", "language": "en"}
            },
            "/api/batch": {
                "method": "POST",
                "description": "Batch process multiple texts",
                "authentication": "Optional (X-API-Key header)",
                "request_body": {
                    "texts": "array of strings (required)",
                    "language": "string (optional, default: en)",
                    "save_history": "boolean (optional, default: true)"
                },
                "example": {"texts": ["Great product!", "Terrible service", "It was okay"]}
            },
            "/api/history": {
                "method": "GET",
                "description": "Get historical sentiment analysis results",
                "authentication": "Optional (X-API-Key header)",
                "query_parameters": {
                    "limit": "integer (optional, default: 100)",
                    "offset": "integer (optional, default: 0)",
                    "sentiment": "string (optional, filter by sentiment)"
                }
            },
            "/api/stats": {
                "method": "GET",
                "description": "Get sentiment analysis statistics",
                "authentication": "Optional (X-API-Key header)"
            },
            "/api/export": {
                "method": "GET",
                "description": "Export historical data",
                "authentication": "Optional (X-API-Key header)",
                "query_parameters": {
                    "format": "string (optional, json or csv, default: json)"
                }
            }
        },
        "supported_languages": Language::SUPPORTED,
        "authentication": {
            "type": "API Key (Optional)",
            "header": "X-API-Key"
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "models_loaded": state.service.models_loaded(),
        "version": API_VERSION,
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    (StatusCode::OK, state.metrics.render()).into_response()
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let request = json_body(body)?.into_request()?;
    tracing::debug!(language = %request.language, chars = request.text.len(), "analyze");

    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.analyze(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("analysis task failed: {e}")))?;
    Ok(Json(result))
}

async fn batch_analyze(
    State(state): State<AppState>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let request = json_body(body)?.into_request(state.service.max_batch_size())?;
    tracing::debug!(language = %request.language, items = request.texts.len(), "batch");

    let service = state.service.clone();
    let (results, statistics) =
        tokio::task::spawn_blocking(move || service.analyze_batch(&request))
            .await
            .map_err(|e| ApiError::Internal(format!("batch task failed: {e}")))?;
    Ok(Json(BatchResponse {
        results,
        statistics,
    }))
}

async fn history_page(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let page = state.history.query(&params.into_query())?;
    Ok(Json(page).into_response())
}

async fn statistics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.history.stats()?;
    Ok(Json(stats).into_response())
}

async fn export_history(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    match params.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(state.history.export()?).into_response()),
        "csv" => {
            let body = state.history.export_csv()?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=sentiment_history.csv",
                    ),
                ],
                body,
            )
                .into_response())
        }
        other => Err(ApiError::BadRequest(format!(
            "Unsupported export format: {other} (expected json or csv)"
        ))),
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".into())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(body)| body).map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
