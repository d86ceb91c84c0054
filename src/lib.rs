pub mod cache;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod logging;
pub mod matcher;
pub mod reference;
pub mod tracker;
pub mod types;
