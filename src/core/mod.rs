//! Core provisioning logic

pub mod aggregator;
pub mod client;
pub mod error;
pub mod password_cache;
pub mod resource;
pub mod session;
pub mod types;
