//! Index construction and continuity logic.

pub mod asset;
pub mod asset_filter;
pub mod weights;
pub mod rebalance;
pub mod returns;
pub mod index;
pub mod backfill;
pub mod continuity;
pub mod summary;
pub mod config_validation;
pub mod error;
