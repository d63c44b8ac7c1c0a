//! API handlers

mod escrow;

pub use escrow::*;
