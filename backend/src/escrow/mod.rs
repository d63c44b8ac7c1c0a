//! Escrow replica domain module
//!
//! Contains the replica models, the single-writer store the indexer uses,
//! and the read-only query service.

mod model;
mod service;
mod store;

pub use model::*;
pub use service::EscrowQueryService;
pub use store::{PgReplicaStore, ReplicaStore};
