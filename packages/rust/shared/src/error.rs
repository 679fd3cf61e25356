//! Error types for EAScope.
//!
//! Library crates use [`EascopeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all EAScope operations.
#[derive(Debug, thiserror::Error)]
pub enum EascopeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A stage id or artifact key was registered twice.
    #[error("duplicate stage: {what} '{name}' is already registered")]
    DuplicateStage { what: &'static str, name: String },

    /// A stage declared a dependency that is not (yet) registered.
    #[error("unknown dependency: stage '{stage}' depends on unregistered stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    /// The stage graph contains a cycle.
    #[error("cycle detected among stages: {}", stages.join(", "))]
    Cycle { stages: Vec<String> },

    /// A succeeded upstream stage has no artifact in the store.
    ///
    /// Unreachable when skip propagation is correct; reported as a bug.
    #[error("missing upstream artifact: stage '{stage}' needs '{key}' from '{dependency}'")]
    MissingUpstreamArtifact {
        stage: String,
        dependency: String,
        key: String,
    },

    /// Text generation failed for a stage.
    #[error("generation error: {0}")]
    Generation(String),

    /// An artifact key is not present in the store.
    #[error("artifact not found: {key}")]
    NotFound { key: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad parameters, bad keys, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Network/HTTP error talking to a generation backend.
    #[error("network error: {0}")]
    Network(String),

    /// Artifact store error other than a missing key.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EascopeError>;

impl EascopeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for an artifact key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error describes a malformed stage graph.
    ///
    /// These are fatal at construction time and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::DuplicateStage { .. }
                | Self::UnknownDependency { .. }
                | Self::Cycle { .. }
        )
    }

    /// Whether this is a missing-key lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EascopeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = EascopeError::Cycle {
            stages: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "cycle detected among stages: a, b");
    }

    #[test]
    fn configuration_errors_are_grouped() {
        assert!(
            EascopeError::UnknownDependency {
                stage: "b".into(),
                dependency: "a".into(),
            }
            .is_configuration()
        );
        assert!(
            EascopeError::DuplicateStage {
                what: "id",
                name: "a".into(),
            }
            .is_configuration()
        );
        assert!(!EascopeError::Generation("boom".into()).is_configuration());
        assert!(EascopeError::not_found("x.md").is_not_found());
    }
}
