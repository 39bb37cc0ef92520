use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::db::models::{ClubStanding, MatchStatus, Prediction};
use crate::db::Database;
use crate::predictor::{BatchMode, BatchReport, BatchRunner, CancelToken};
use crate::providers::PredictionSink;

/// Predictions listed by `/predictions/upcoming`
const UPCOMING_LIMIT: usize = 10;

type ApiError = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    /// League table and match results
    pub db: Database,
    pub predictions: Arc<dyn PredictionSink>,
    pub runner: Arc<BatchRunner>,
}

/// Build the Axum router for the prediction API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predictions", get(list_handler))
        .route("/predictions/upcoming", get(upcoming_handler))
        .route("/predictions/week/:week", get(week_handler))
        .route("/predictions/fixture/:id", get(fixture_handler))
        .route("/predictions/generate", post(generate_handler))
        .route("/predictions/clear", delete(clear_handler))
        .route("/standings", get(standings_handler))
        .route("/matches/:id/result", put(result_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    let message = message.into();
    (status, Json(json!({ "status": "error", "message": message })))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// GET /predictions
async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    state.predictions.list_all().await.map(Json).map_err(internal)
}

/// GET /predictions/upcoming
async fn upcoming_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    state
        .predictions
        .list_upcoming(UPCOMING_LIMIT)
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /predictions/week/:week
async fn week_handler(
    State(state): State<Arc<AppState>>,
    Path(week): Path<u32>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    state
        .predictions
        .list_by_week(week)
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /predictions/fixture/:id
async fn fixture_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Prediction>, ApiError> {
    match state.predictions.find_by_fixture(id).await.map_err(internal)? {
        Some(p) => Ok(Json(p)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no prediction for fixture {}", id),
        )),
    }
}

/// POST /predictions/generate
async fn generate_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BatchReport>, ApiError> {
    info!("Prediction regeneration requested over HTTP");
    state
        .runner
        .generate_batch(BatchMode::All, &CancelToken::new())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Prediction regeneration failed: {}", e);
            internal(e)
        })
}

/// DELETE /predictions/clear
async fn clear_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let deleted = state.predictions.clear().await.map_err(internal)?;
    info!("Cleared {} predictions", deleted);
    Ok(Json(json!({
        "status": "success",
        "message": format!("Deleted {} predictions", deleted),
        "deleted": deleted,
    })))
}

/// GET /standings
async fn standings_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ClubStanding>>, ApiError> {
    state.db.list_standings().map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    home_score: u32,
    away_score: u32,
    #[serde(default)]
    correction: bool,
}

/// PUT /matches/:id/result
async fn result_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ResultBody>,
) -> Result<Json<Value>, ApiError> {
    let existing = state.db.get_match(id).map_err(internal)?;
    match existing {
        None => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("match {} not found", id),
            ))
        }
        Some(m) if m.status == MatchStatus::Finished && !body.correction => {
            return Err(api_error(
                StatusCode::CONFLICT,
                format!("match {} is already finished", id),
            ))
        }
        Some(_) => {}
    }
    state
        .db
        .record_result(id, body.home_score, body.away_score, body.correction)
        .map_err(internal)?;
    info!(
        "Recorded result for match {}: {}-{}{}",
        id,
        body.home_score,
        body.away_score,
        if body.correction { " (correction)" } else { "" }
    );
    Ok(Json(json!({ "status": "success", "match_id": id })))
}
