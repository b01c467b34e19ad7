//! Read-only connection endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use calsync_core::{Appointment, CalendarConnection, SyncError};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connections/{id}", get(get_connection))
        .route("/connections/{id}/appointments", get(list_appointments))
}

async fn load(state: &AppState, id: &str) -> Result<CalendarConnection, AppError> {
    let connection = state
        .connections
        .get(id)
        .await?
        .ok_or_else(|| SyncError::ConnectionNotFound(id.to_string()))?;
    Ok(connection)
}

/// GET /connections/{id} - Connection with its last sync status
async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CalendarConnection>, AppError> {
    Ok(Json(load(&state, &id).await?))
}

/// GET /connections/{id}/appointments - Appointments imported from the connection
async fn list_appointments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let connection = load(&state, &id).await?;
    let appointments = state.appointments.list_for_connection(&connection.id).await?;
    Ok(Json(appointments))
}
