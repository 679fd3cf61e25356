//! Shared types, error model, and configuration for EAScope.
//!
//! This crate is the foundation depended on by all other EAScope crates.
//! It provides:
//! - [`EascopeError`]: the unified error type
//! - Domain types ([`Parameters`], [`ProjectInput`], [`Artifact`], [`RunId`])
//! - Configuration ([`AppConfig`], [`StageConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BridgeConfig, DefaultsConfig, GeneratorKind, OpenRouterConfig, ParametersConfig,
    ResponseConfig, StageConfig, config_dir, config_file_path, default_stages, init_config,
    load_config, load_config_from, validate_api_key, validate_config,
};
pub use error::{EascopeError, Result};
pub use types::{Artifact, Parameters, ProjectInput, RunId, content_hash};
