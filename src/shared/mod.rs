//! Shared layer - errors, configuration and common types

pub mod config;
pub mod errors;
pub mod types;
