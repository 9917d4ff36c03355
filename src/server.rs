use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{GroundedExecutor, UNAVAILABLE_MESSAGE};
use crate::app;
use crate::cli::ServeArgs;
use crate::error::NavigatorError;
use crate::model::ProviderPriceRating;
use crate::ranking::ProviderSearch;
use crate::store::Store;

#[derive(Clone)]
struct AppState {
    store: Store,
    executor: Arc<GroundedExecutor>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let (store, engine) = app::open_engine(&opts.data_dir)?;
    let executor = app::build_executor(engine, &opts.assistant)?;
    let app = router(store, executor);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(store: Store, executor: GroundedExecutor) -> Router {
    let state = AppState {
        store,
        executor: Arc::new(executor),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api_index))
        .route("/providers", get(api_providers))
        .route("/ask", post(api_ask))
        .route("/healthz", get(api_healthz))
        .layer(cors)
        .with_state(state)
}

/// Maps core errors onto HTTP statuses. Store failures keep their detail in
/// the log only.
struct ApiError(NavigatorError);

impl From<NavigatorError> for ApiError {
    fn from(e: NavigatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            NavigatorError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            NavigatorError::GeoLookup { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            NavigatorError::TranslationUnavailable { reason } => {
                tracing::warn!(%reason, "assistant unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE.to_string())
            }
            // /ask turns rejections into refusal answers; anything else is a bug.
            NavigatorError::TranslationRejected { reason } => {
                tracing::error!(%reason, "translation rejection escaped the executor");
                internal_error()
            }
            NavigatorError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                internal_error()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

async fn api_index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "cost-navigator",
        "endpoints": {
            "GET /providers": "drg, zip, radius_km, limit",
            "POST /ask": "{\"question\": \"...\"}",
            "GET /healthz": "store health",
        }
    }))
}

async fn api_providers(
    State(st): State<AppState>,
    Query(p): Query<ProviderSearch>,
) -> Result<Json<Vec<ProviderPriceRating>>, ApiError> {
    let rows = st.executor.engine().search(&p)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    results: Vec<ProviderPriceRating>,
    is_out_of_scope: bool,
}

async fn api_ask(
    State(st): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = st.executor.answer(&req.question).await?;
    Ok(Json(AskResponse {
        answer: answer.text,
        results: answer.rows,
        is_out_of_scope: answer.is_out_of_scope,
    }))
}

async fn api_healthz(State(st): State<AppState>) -> impl IntoResponse {
    match st.store.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
