//! On-demand sync endpoint

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use calsync_core::{SyncRequest, SyncResponse};
use serde::Serialize;

use crate::routes::AppError;
use crate::state::AppState;

const FETCH_FAILURE_HINT: &str = "verify the address is reachable and in the expected format";

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", post(sync_now))
}

/// Body returned when the feed could not be retrieved
#[derive(Serialize)]
pub struct FetchFailureResponse {
    #[serde(flatten)]
    pub result: SyncResponse,
    pub hint: &'static str,
}

/// POST /sync - Sync one connection now
async fn sync_now(
    State(state): State<AppState>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    let report = state.engine.sync_now(&req).await?;
    let result = SyncResponse::from(&report);

    if report.fetch_failed {
        let body = FetchFailureResponse {
            result,
            hint: FETCH_FAILURE_HINT,
        };
        return Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response());
    }

    Ok(Json(result).into_response())
}
