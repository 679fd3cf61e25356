//! Core domain types for EAScope runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{EascopeError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
///
/// Each run gets its own artifact namespace keyed by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Caller-supplied scalars that seed every stage.
///
/// Keys are kept sorted so prompts and manifests render deterministically.
/// There is no mutating API: a `Parameters` value is fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    /// Build from any iterator of key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every required key is present with a non-blank value.
    ///
    /// All problems are reported together.
    pub fn validate(&self, required: &[String]) -> Result<()> {
        let mut problems = Vec::new();

        for key in required {
            match self.0.get(key) {
                None => problems.push(format!("missing parameter '{key}'")),
                Some(v) if v.trim().is_empty() => {
                    problems.push(format!("parameter '{key}' is blank"))
                }
                Some(_) => {}
            }
        }

        for (key, value) in &self.0 {
            if !required.contains(key) && value.trim().is_empty() {
                problems.push(format!("parameter '{key}' is blank"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EascopeError::validation(problems.join("; ")))
        }
    }
}

impl From<BTreeMap<String, String>> for Parameters {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// ProjectInput
// ---------------------------------------------------------------------------

/// The typed scoping request accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInput {
    pub project_name: String,
    pub location_region: String,
    pub cobalt_type: String,
    pub scale: String,
}

impl From<ProjectInput> for Parameters {
    fn from(input: ProjectInput) -> Self {
        Parameters::from_pairs([
            ("project_name", input.project_name),
            ("location_region", input.location_region),
            ("cobalt_type", input.cobalt_type),
            ("scale", input.scale),
        ])
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A text blob produced by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable key the blob is stored under.
    pub key: String,
    /// Generated text.
    pub content: String,
    /// Id of the stage that produced it.
    pub produced_by: String,
    /// When the stage finished writing it.
    pub created_at: DateTime<Utc>,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
}

impl Artifact {
    /// Create an artifact stamped with the current time.
    pub fn new(
        key: impl Into<String>,
        content: impl Into<String>,
        produced_by: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            key: key.into(),
            content_hash: content_hash(&content),
            content,
            produced_by: produced_by.into(),
            created_at: Utc::now(),
        }
    }
}

/// SHA-256 hex digest of a text blob.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<String> {
        vec!["project_name".into(), "scale".into()]
    }

    #[test]
    fn run_id_roundtrips_through_string() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parameters_validate_ok() {
        let params = Parameters::from_pairs([("project_name", "North"), ("scale", "Large")]);
        assert!(params.validate(&required()).is_ok());
    }

    #[test]
    fn parameters_validate_reports_all_problems() {
        let params = Parameters::from_pairs([("project_name", "  "), ("extra", "")]);
        let err = params.validate(&required()).unwrap_err().to_string();
        assert!(err.contains("'project_name' is blank"));
        assert!(err.contains("missing parameter 'scale'"));
        assert!(err.contains("'extra' is blank"));
    }

    #[test]
    fn project_input_converts_to_parameters() {
        let params: Parameters = ProjectInput {
            project_name: "Northern Cobalt Initiative".into(),
            location_region: "Skeena".into(),
            cobalt_type: "Sediment-Hosted Stratiform".into(),
            scale: "Large".into(),
        }
        .into();
        assert_eq!(params.len(), 4);
        assert_eq!(params.get("location_region"), Some("Skeena"));
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["cobalt_type", "location_region", "project_name", "scale"]
        );
    }

    #[test]
    fn artifact_hash_matches_content() {
        let artifact = Artifact::new("a.md", "hello", "stage_a");
        assert_eq!(artifact.content_hash, content_hash("hello"));
        assert_eq!(artifact.content_hash.len(), 64);
    }

    #[test]
    fn parameters_serialize_as_flat_map() {
        let params = Parameters::from_pairs([("scale", "Large")]);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"scale":"Large"}"#);
    }
}
