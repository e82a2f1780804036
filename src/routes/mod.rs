pub mod health;
pub mod project;
pub mod time_entry;
pub mod timer;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// All HTTP routes. Everything under `/api` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/timer/start", post(timer::start_timer))
        .route("/api/timer/running", get(timer::running_timer))
        .route("/api/time-entries/:id/stop", post(timer::stop_timer))
        .route(
            "/api/time-entries",
            get(time_entry::list_my_entries).post(time_entry::create_manual_entry),
        )
        .route(
            "/api/time-entries/:id",
            axum::routing::patch(time_entry::update_entry).delete(time_entry::delete_entry),
        )
        .route(
            "/api/projects/:id/time-entries",
            get(project::list_project_entries),
        )
        .route("/api/projects/:id/time-totals", get(project::project_totals))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::require_user,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
}
