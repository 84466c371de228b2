//! Core types and utilities for svcmgr
//!
//! # Modules
//!
//! - `config`: YAML configuration with environment overrides
//! - `error`: Error types and Result alias
//! - `logging`: tracing subscriber setup with a runtime level handle
//! - `types`: Service model shared by every provider and transport

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-exports
pub use config::{Config, HttpConfig, LogConfig, ProviderConfig, ServerConfig, SessionConfig};
pub use error::{Error, Result};
pub use logging::{LogHandle, LoggingLevel};
pub use types::*;
