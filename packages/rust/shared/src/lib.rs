//! Shared types, error model, and configuration for refsync.
//!
//! This crate is the foundation depended on by all other refsync crates.
//! It provides:
//! - [`RefsyncError`] — the unified error type
//! - The [`Record`] domain type and content fingerprinting
//! - The [`FileKind`] registry and content classifier
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod kinds;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, ConverterConfig, DebugConfig, StorageConfig, load_config_from,
    validate_config,
};
pub use error::{RefsyncError, Result};
pub use kinds::{FileKind, classify, is_known_content_type, resolve_extension};
pub use types::{Record, fingerprint, parse_timestamp};
