//! Route definitions for the Paywarden API

mod escrow;

pub use escrow::escrow_routes;
