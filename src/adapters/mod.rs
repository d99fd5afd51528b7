//! Concrete implementations of the port traits.

pub mod csv_adapter;
pub mod csv_report;
pub mod file_config_adapter;
pub mod portfolio_file;
pub mod price_table;
pub mod text_report;
