//! Core functionality: error types and configuration.

pub mod config;
pub mod error;
