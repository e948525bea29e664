//! Filesystem implementations of the ports.

pub mod csv_archive_adapter;
pub mod csv_price_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod file_listing_adapter;
pub mod overrides_adapter;
