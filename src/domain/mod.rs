pub mod app_config;
pub mod conversion;
pub mod error;
pub mod session;
pub mod summary;
pub mod table;
pub mod upload;
