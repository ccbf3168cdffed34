//! Punch, reset and summary routes under `/punches`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{JsonBody, SharedState, require_admin};
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Event;
use crate::types::{DateRange, PunchFilter};

#[derive(Debug, Deserialize)]
struct PunchInRequest {
    mechanic_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditPunchRequest {
    punch_in: Option<DateTime<Utc>>,
    punch_out: Option<DateTime<Utc>>,
    password: Option<String>,
}

/// Body of password-only admin actions.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AdminRequest {
    pub password: Option<String>,
}

pub(super) fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_punches))
        .route("/active/{mechanic_name}", get(active_punch))
        .route("/punch-in", post(punch_in))
        .route("/punch-out/{id}", put(punch_out))
        .route("/summary/payroll", get(payroll_summary))
        .route("/summary/car-costs", get(car_costs_summary))
        .route("/summary/mechanic-cars", get(mechanic_cars_summary))
        .route(
            "/summary/mechanic-sessions/{mechanic_name}",
            get(mechanic_sessions),
        )
        .route("/reset-hours", post(reset_all_hours))
        .route("/reset-hours/{mechanic_name}", post(reset_hours))
        .route("/delete-all", delete(delete_all))
        .route("/{id}/edit", put(edit_punch))
        .route("/{id}", delete(delete_punch))
}

async fn list_punches(
    State(state): State<SharedState>,
    Query(filter): Query<PunchFilter>,
) -> ServiceResult<impl IntoResponse> {
    let page = state.db.call(move |db| db.list_punches(&filter)).await?;
    Ok(Json(page))
}

async fn active_punch(
    State(state): State<SharedState>,
    Path(mechanic_name): Path<String>,
) -> ServiceResult<impl IntoResponse> {
    let punch = state
        .db
        .call(move |db| db.active_punch(&mechanic_name))
        .await?;
    Ok(Json(json!({ "active": punch.is_some(), "punch": punch })))
}

async fn punch_in(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<PunchInRequest>,
) -> ServiceResult<impl IntoResponse> {
    let punch = state
        .db
        .call(move |db| db.punch_in(req.mechanic_name))
        .await?;
    state.publish(Event::PunchAdded(punch.clone()));
    Ok((StatusCode::CREATED, Json(punch)))
}

async fn punch_out(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ServiceResult<impl IntoResponse> {
    let punch = state.db.call(move |db| db.punch_out(id)).await?;
    state.publish(Event::PunchUpdated(punch.clone()));
    Ok(Json(punch))
}

async fn edit_punch(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<EditPunchRequest>,
) -> ServiceResult<impl IntoResponse> {
    require_admin(&state, req.password.as_deref())?;
    let punch_in = req
        .punch_in
        .ok_or_else(|| ServiceError::missing_field("punch_in"))?;

    let punch = state
        .db
        .call(move |db| db.edit_punch(id, punch_in, req.punch_out))
        .await?;
    state.publish(Event::PunchUpdated(punch.clone()));
    Ok(Json(punch))
}

async fn delete_punch(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ServiceResult<impl IntoResponse> {
    let punch = state
        .db
        .call(move |db| db.delete_punch(id))
        .await?
        .ok_or_else(|| ServiceError::punch_not_found(id))?;
    state.publish(Event::PunchDeleted { id });
    Ok(Json(json!({ "message": "Punch deleted successfully", "punch": punch })))
}

async fn delete_all(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<AdminRequest>,
) -> ServiceResult<impl IntoResponse> {
    require_admin(&state, req.password.as_deref())?;
    let outcome = state.db.call(|db| db.delete_all_punches()).await?;
    state.publish(Event::AllDataCleared(outcome));
    Ok(Json(json!({
        "message": "All punches and car sessions deleted",
        "deleted_sessions": outcome.deleted_sessions,
        "deleted_punches": outcome.deleted_punches,
    })))
}

async fn reset_hours(
    State(state): State<SharedState>,
    Path(mechanic_name): Path<String>,
) -> ServiceResult<impl IntoResponse> {
    let name = mechanic_name.clone();
    let mechanic = state.db.call(move |db| db.reset_hours(&name)).await?;
    state.publish(Event::HoursReset { mechanic_name });
    Ok(Json(json!({ "message": "Hours reset successfully", "mechanic": mechanic })))
}

async fn reset_all_hours(State(state): State<SharedState>) -> ServiceResult<impl IntoResponse> {
    let mechanics = state.db.call(|db| db.reset_all_hours()).await?;
    state.publish(Event::AllHoursReset);
    Ok(Json(json!({ "message": "All hours reset successfully", "mechanics": mechanics })))
}

async fn payroll_summary(
    State(state): State<SharedState>,
    Query(range): Query<DateRange>,
) -> ServiceResult<impl IntoResponse> {
    let summary = state.db.call(move |db| db.payroll_summary(&range)).await?;
    Ok(Json(summary))
}

async fn car_costs_summary(
    State(state): State<SharedState>,
    Query(range): Query<DateRange>,
) -> ServiceResult<impl IntoResponse> {
    let summary = state.db.call(move |db| db.car_costs_summary(&range)).await?;
    Ok(Json(summary))
}

async fn mechanic_cars_summary(
    State(state): State<SharedState>,
    Query(range): Query<DateRange>,
) -> ServiceResult<impl IntoResponse> {
    let summary = state
        .db
        .call(move |db| db.mechanic_cars_summary(&range))
        .await?;
    Ok(Json(summary))
}

async fn mechanic_sessions(
    State(state): State<SharedState>,
    Path(mechanic_name): Path<String>,
    Query(range): Query<DateRange>,
) -> ServiceResult<impl IntoResponse> {
    let sessions = state
        .db
        .call(move |db| db.mechanic_sessions(&mechanic_name, &range))
        .await?;
    Ok(Json(sessions))
}
