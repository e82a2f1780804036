use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::{
    dto::time_entry_dto::{ProjectTotalsResponse, TimeEntryListResponse},
    error::Result,
    middleware::auth::AuthUser,
    models::time_entry::DateRange,
    AppState,
};

#[axum::debug_handler]
pub async fn list_project_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> Result<impl IntoResponse> {
    let items = state.timer_service.list_entries(user.id, id, range).await?;
    Ok(Json(TimeEntryListResponse::from(items)))
}

#[axum::debug_handler]
pub async fn project_totals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let totals = state.timer_service.project_totals(user.id, id).await?;
    Ok(Json(ProjectTotalsResponse {
        project_id: id,
        totals,
    }))
}
