//! Collaborator traits the domain depends on.

pub mod config_port;
pub mod daily_data_port;
pub mod listing_port;
pub mod price_port;
pub mod report_port;
