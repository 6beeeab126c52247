//! Shared types, error model, and configuration for rowpipe.
//!
//! This crate is the foundation depended on by all other rowpipe crates.
//! It provides:
//! - [`RowpipeError`]: the unified error type
//! - Domain types ([`CanonicalRecord`], [`RawRow`], [`BatchOutcome`], [`Locator`])
//! - Configuration ([`AppConfig`] and one section per external collaborator)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CredentialsConfig, EnrichmentConfig, NotifierConfig, ObjectSourceConfig,
    ServerConfig, StoreConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{Result, RowpipeError};
pub use types::{
    BatchOutcome, CanonicalRecord, Locator, PROCESSOR_VERSION, RawRow, RecordKey, RecordPatch,
    RejectReason, RowError, Source,
};
