//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::escrow::EscrowQueryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<EscrowQueryService>,
    pub db_pool: PgPool,
}

impl AppState {
    pub fn new(query_service: Arc<EscrowQueryService>, db_pool: PgPool) -> Self {
        Self {
            query_service,
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<EscrowQueryService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.query_service.clone()
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}
