//! Task routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use super::{JsonBody, SharedState};
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Event;
use crate::types::{NewTask, TaskFilter, TaskUpdate};

pub(super) fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/priority/list", get(list_priority_tasks))
        .route(
            "/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}

async fn list_tasks(
    State(state): State<SharedState>,
    Query(filter): Query<TaskFilter>,
) -> ServiceResult<impl IntoResponse> {
    let tasks = state.db.call(move |db| db.list_tasks(&filter)).await?;
    Ok(Json(tasks))
}

async fn list_priority_tasks(State(state): State<SharedState>) -> ServiceResult<impl IntoResponse> {
    let tasks = state.db.call(|db| db.list_priority_tasks()).await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ServiceResult<impl IntoResponse> {
    match state.db.call(move |db| db.get_task(id)).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ServiceError::task_not_found(id)),
    }
}

async fn create_task(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<NewTask>,
) -> ServiceResult<impl IntoResponse> {
    let task = state.db.call(move |db| db.create_task(input)).await?;
    state.publish(Event::TaskAdded(task.clone()));
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    JsonBody(update): JsonBody<TaskUpdate>,
) -> ServiceResult<impl IntoResponse> {
    let outcome = state.db.call(move |db| db.update_task(id, update)).await?;

    for mechanic in outcome.mechanics {
        state.publish(Event::MechanicUpdated(mechanic));
    }
    state.publish(Event::TaskUpdated(outcome.task.clone()));
    Ok(Json(outcome.task))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ServiceResult<impl IntoResponse> {
    if !state.db.call(move |db| db.delete_task(id)).await? {
        return Err(ServiceError::task_not_found(id));
    }
    state.publish(Event::TaskDeleted { id });
    Ok(Json(serde_json::json!({ "message": "Task deleted successfully", "id": id })))
}
