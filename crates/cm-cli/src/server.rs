//! HTTP surface over the engine.
//!
//! Thin handlers only: deserialize, call the engine, map errors to status
//! codes. Anything with logic belongs in [`crate::engine`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cm_core::Window;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, SaveRequest};
use crate::error::EngineError;

type AppState = Arc<Engine>;

pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/items", post(save_item))
        .route("/items/{id}", delete(unsave_item))
        .route("/items/{id}/analyze", post(analyze_item))
        .route("/items/{id}/similar", get(similar_items))
        .route("/opinions", post(form_opinion))
        .route("/opinions/{id}/feedback", post(opinion_feedback))
        .route("/trending/{window}", get(trending))
        .route("/digest/{window}", get(digest))
        .route("/recommendations/{user}", get(recommendations))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve until ctrl-c or external cancellation.
pub async fn serve(engine: AppState, bind: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on {bind}");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("ctrl-c received, shutting down");
                }
            }
        })
        .await?;
    Ok(())
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadySaved { .. } => StatusCode::CONFLICT,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// --- Request/response types ---

#[derive(Debug, Deserialize)]
struct OpinionRequest {
    content_id: String,
    requested_by: String,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Serialize)]
struct OpinionResponse {
    tier: &'static str,
    opinion: cm_core::Opinion,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    delta: f64,
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    #[serde(default = "default_similar_limit")]
    limit: usize,
}

fn default_similar_limit() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct UnsaveQuery {
    saved_by: String,
}

// --- Handlers ---

async fn save_item(
    State(engine): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let scores = engine.save(req).await?;
    Ok((StatusCode::CREATED, Json(scores)))
}

async fn unsave_item(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UnsaveQuery>,
) -> Result<StatusCode, EngineError> {
    engine.unsave(&id, &query.saved_by).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze_item(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let scores = engine.analyze(&id).await?;
    Ok(Json(scores))
}

async fn similar_items(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SimilarQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let hits = engine.find_similar(&id, query.limit).await?;
    Ok(Json(hits))
}

async fn form_opinion(
    State(engine): State<AppState>,
    Json(req): Json<OpinionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let result = engine
        .opinion(&req.content_id, &req.requested_by, &req.prompt)
        .await?;
    Ok(Json(OpinionResponse {
        tier: result.tier.as_str(),
        opinion: result.value,
    }))
}

async fn opinion_feedback(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let confidence = engine.opinion_feedback(&id, req.delta).await?;
    Ok(Json(serde_json::json!({ "confidence": confidence })))
}

async fn trending(
    State(engine): State<AppState>,
    Path(window): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let window: Window = window.parse().map_err(EngineError::Validation)?;
    Ok(Json(engine.trending(window).await))
}

async fn digest(
    State(engine): State<AppState>,
    Path(window): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let window: Window = window.parse().map_err(EngineError::Validation)?;
    let result = engine.digest(window).await;
    Ok(Json(serde_json::json!({
        "tier": result.tier.as_str(),
        "digest": result.value,
    })))
}

async fn recommendations(
    State(engine): State<AppState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let profile = engine.recommend(&user).await?;
    Ok(Json(profile))
}

async fn stats(State(engine): State<AppState>) -> Result<impl IntoResponse, EngineError> {
    let stats = engine.stats().await?;
    Ok(Json(serde_json::json!({
        "items": stats.items,
        "opinions": stats.opinions,
        "users": stats.users,
        "tracked_topics": stats.tracked_topics,
        "generative_configured": stats.generative_configured,
        "schema_version": stats.db_schema_version,
    })))
}
