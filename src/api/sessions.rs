//! Car work session and car-hours routes under `/punches`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use super::punches::AdminRequest;
use super::{JsonBody, SharedState, require_admin};
use crate::error::ServiceResult;
use crate::realtime::Event;
use crate::types::{NewCarSession, SessionFilter};

#[derive(Debug, Default, Deserialize)]
struct EndSessionRequest {
    notes: Option<String>,
    total_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HoursRequest {
    total_hours: Option<f64>,
    password: Option<String>,
}

pub(super) fn router() -> Router<SharedState> {
    Router::new()
        .route("/car-sessions", get(list_sessions))
        .route("/car-sessions/active/{mechanic_name}", get(active_session))
        .route("/car-sessions/start", post(start_session))
        .route("/car-sessions/end/{id}", put(end_session))
        .route("/car-sessions/{id}/edit", put(edit_session))
        .route("/car-hours/{car_id}", put(set_car_hours))
        .route("/reset-car-hours", post(reset_car_hours))
}

async fn list_sessions(
    State(state): State<SharedState>,
    Query(filter): Query<SessionFilter>,
) -> ServiceResult<impl IntoResponse> {
    let sessions = state.db.call(move |db| db.list_sessions(&filter)).await?;
    Ok(Json(sessions))
}

async fn active_session(
    State(state): State<SharedState>,
    Path(mechanic_name): Path<String>,
) -> ServiceResult<impl IntoResponse> {
    let session = state
        .db
        .call(move |db| db.active_session(&mechanic_name))
        .await?;
    Ok(Json(json!({ "active": session.is_some(), "session": session })))
}

async fn start_session(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<NewCarSession>,
) -> ServiceResult<impl IntoResponse> {
    let session = state.db.call(move |db| db.start_session(input)).await?;
    state.publish(Event::CarSessionStarted(session.clone()));
    Ok((StatusCode::CREATED, Json(session)))
}

/// The body is optional; an empty request closes the session with derived hours.
async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    body: Option<JsonBody<EndSessionRequest>>,
) -> ServiceResult<impl IntoResponse> {
    let req = body.map(|JsonBody(req)| req).unwrap_or_default();
    let session = state
        .db
        .call(move |db| db.end_session(id, req.notes, req.total_hours))
        .await?;
    state.publish(Event::CarSessionEnded(session.clone()));
    Ok(Json(session))
}

async fn edit_session(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<HoursRequest>,
) -> ServiceResult<impl IntoResponse> {
    require_admin(&state, req.password.as_deref())?;
    let session = state
        .db
        .call(move |db| db.edit_session_hours(id, req.total_hours))
        .await?;
    state.publish(Event::CarSessionUpdated(session.clone()));
    Ok(Json(session))
}

async fn set_car_hours(
    State(state): State<SharedState>,
    Path(car_id): Path<i64>,
    JsonBody(req): JsonBody<HoursRequest>,
) -> ServiceResult<impl IntoResponse> {
    require_admin(&state, req.password.as_deref())?;
    let outcome = state
        .db
        .call(move |db| db.set_car_total_hours(car_id, req.total_hours))
        .await?;

    let message = if outcome.old_total == 0.0 {
        "No work sessions to update"
    } else {
        state.publish(Event::CarHoursUpdated {
            car_id,
            new_total: outcome.new_total,
        });
        "Car hours updated successfully"
    };
    Ok(Json(json!({
        "message": message,
        "car_id": outcome.car_id,
        "old_total": outcome.old_total,
        "new_total": outcome.new_total,
        "ratio": outcome.ratio,
        "updated_sessions": outcome.updated_sessions,
    })))
}

async fn reset_car_hours(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<AdminRequest>,
) -> ServiceResult<impl IntoResponse> {
    require_admin(&state, req.password.as_deref())?;
    let deleted_sessions = state.db.call(|db| db.reset_car_hours()).await?;
    state.publish(Event::CarHoursReset { deleted_sessions });
    Ok(Json(json!({
        "message": "All car hours reset successfully",
        "deleted_sessions": deleted_sessions,
    })))
}
