//! Car routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use super::{JsonBody, SharedState};
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Event;
use crate::types::NewCar;

pub(super) fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_cars).post(create_car))
        .route("/{id}", get(get_car))
}

async fn list_cars(State(state): State<SharedState>) -> ServiceResult<impl IntoResponse> {
    let cars = state.db.call(|db| db.list_cars()).await?;
    Ok(Json(cars))
}

async fn get_car(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ServiceResult<impl IntoResponse> {
    match state.db.call(move |db| db.get_car(id)).await? {
        Some(car) => Ok(Json(car)),
        None => Err(ServiceError::car_not_found(id)),
    }
}

async fn create_car(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<NewCar>,
) -> ServiceResult<impl IntoResponse> {
    let car = state.db.call(move |db| db.create_car(input)).await?;
    state.publish(Event::CarAdded(car.clone()));
    Ok((StatusCode::CREATED, Json(car)))
}
