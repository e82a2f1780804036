pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::{postgres::PgTimeEntryStore, store::TimeEntryStore};
use crate::services::timer_service::TimerService;
use crate::utils::time::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub timer_service: TimerService,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self::with_store(
            Arc::new(PgTimeEntryStore::new(pool)),
            Arc::new(SystemClock),
            &config.jwt_secret,
        )
    }

    pub fn with_store(
        store: Arc<dyn TimeEntryStore>,
        clock: Arc<dyn Clock>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            timer_service: TimerService::new(store, clock),
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
