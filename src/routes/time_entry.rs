use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::time_entry_dto::{CreateManualEntryPayload, TimeEntryListResponse, UpdateEntryPayload},
    error::Result,
    middleware::auth::AuthUser,
    models::time_entry::DateRange,
    AppState,
};

#[axum::debug_handler]
pub async fn create_manual_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateManualEntryPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let entry = state.timer_service.add_manual_entry(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[axum::debug_handler]
pub async fn list_my_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<DateRange>,
) -> Result<impl IntoResponse> {
    let items = state.timer_service.list_user_entries(user.id, range).await?;
    Ok(Json(TimeEntryListResponse::from(items)))
}

#[axum::debug_handler]
pub async fn update_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEntryPayload>,
) -> Result<impl IntoResponse> {
    let entry = state.timer_service.update_entry(id, user.id, payload).await?;
    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.timer_service.delete_entry(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
