//! Escrow query handlers
//!
//! Thin read-only projections over the replica. Mutations happen on the
//! ledger directly; nothing here writes.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::{ApiError, ApiResult};
use crate::escrow::{EscrowRow, EscrowStats, ListEscrowsQuery};
use crate::state::AppState;

/// List escrows with filters and pagination
pub async fn list_escrows(
    State(app_state): State<AppState>,
    Query(query): Query<ListEscrowsQuery>,
) -> ApiResult<Json<Vec<EscrowRow>>> {
    let escrows = app_state
        .query_service
        .list_escrows(query)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(escrows))
}

/// Get one escrow by its (chain, id) identity
pub async fn get_escrow(
    State(app_state): State<AppState>,
    Path((chain_id, escrow_id)): Path<(i64, i64)>,
) -> ApiResult<Json<EscrowRow>> {
    let escrow = app_state
        .query_service
        .get_escrow(chain_id, escrow_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("escrow {}/{} not found", chain_id, escrow_id))
        })?;

    Ok(Json(escrow))
}

/// All escrows a participant is party to
pub async fn get_escrows_by_participant(
    State(app_state): State<AppState>,
    Path(participant): Path<String>,
) -> ApiResult<Json<Vec<EscrowRow>>> {
    if participant.trim().is_empty() {
        return Err(ApiError::BadRequest("participant must be non-empty".into()));
    }

    let escrows = app_state
        .query_service
        .get_by_participant(&participant)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(escrows))
}

#[derive(Debug, serde::Deserialize)]
pub struct StatsQuery {
    pub chain_id: Option<i64>,
}

/// Aggregate statistics over the replica
pub async fn get_stats(
    State(app_state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<EscrowStats>> {
    let stats = app_state
        .query_service
        .stats(query.chain_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(stats))
}
