//! Paywarden Backend Library
//!
//! Off-chain side of the Paywarden escrow platform: the event indexer that
//! mirrors ledger state into a queryable replica, and the read-only API
//! over that replica.

pub mod config;
pub mod db;
pub mod error;
pub mod escrow;
pub mod handlers;
pub mod indexer;
pub mod notifier;
pub mod routes;
pub mod state;
