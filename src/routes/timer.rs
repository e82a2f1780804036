use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::time_entry_dto::{RunningTimerResponse, StartTimerPayload, StartTimerResponse},
    error::Result,
    middleware::auth::AuthUser,
    AppState,
};

#[axum::debug_handler]
pub async fn start_timer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<StartTimerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let started = state.timer_service.start_timer(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(StartTimerResponse::from(started))))
}

#[axum::debug_handler]
pub async fn stop_timer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let entry = state.timer_service.stop_timer(id, user.id).await?;
    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn running_timer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let running = state
        .timer_service
        .running_timer(user.id)
        .await?
        .map(|running| RunningTimerResponse {
            entry: running.entry,
            elapsed_seconds: running.elapsed_seconds,
        });
    Ok(Json(running))
}
