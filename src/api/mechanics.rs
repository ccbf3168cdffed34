//! Mechanic routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use super::{JsonBody, SharedState};
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Event;

#[derive(Debug, Deserialize)]
struct CreateMechanicRequest {
    name: Option<String>,
}

pub(super) fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_mechanics).post(create_mechanic))
        .route("/{name}", get(get_mechanic))
}

async fn list_mechanics(State(state): State<SharedState>) -> ServiceResult<impl IntoResponse> {
    let mechanics = state.db.call(|db| db.list_mechanics()).await?;
    Ok(Json(mechanics))
}

async fn get_mechanic(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ServiceResult<impl IntoResponse> {
    let lookup = name.clone();
    match state.db.call(move |db| db.get_mechanic(&lookup)).await? {
        Some(mechanic) => Ok(Json(mechanic)),
        None => Err(ServiceError::mechanic_not_found(&name)),
    }
}

async fn create_mechanic(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<CreateMechanicRequest>,
) -> ServiceResult<impl IntoResponse> {
    let mechanic = state.db.call(move |db| db.create_mechanic(req.name)).await?;
    state.publish(Event::MechanicAdded(mechanic.clone()));
    Ok((StatusCode::CREATED, Json(mechanic)))
}
