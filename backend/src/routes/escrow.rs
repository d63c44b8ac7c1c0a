//! Escrow route definitions

use axum::{routing::get, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn escrow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/escrows", get(list_escrows))
        .route("/api/escrows/stats", get(get_stats))
        .route("/api/escrows/:chain_id/:escrow_id", get(get_escrow))
        .route(
            "/api/participants/:participant/escrows",
            get(get_escrows_by_participant),
        )
}
