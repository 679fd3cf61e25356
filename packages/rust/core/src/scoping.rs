//! End-to-end scoping run: parameters → stages → structured response.
//!
//! Each run gets its own directory:
//! ```text
//! <output_root>/<run_id>/
//! ├── user_inputs.json
//! ├── project_parameters.md   (one file per stage artifact)
//! ├── ...
//! ├── response.json
//! └── manifest.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use eascope_shared::{AppConfig, EascopeError, Parameters, Result, RunId};
use eascope_storage::{ArtifactStore, FsStore};

use crate::cancel::CancelToken;
use crate::generator::TextGenerator;
use crate::graph::StageGraph;
use crate::response::{ScopingResponse, assemble_response};
use crate::runner::{PipelineResult, PipelineRunner, ProgressReporter, StageStatus};

/// Current `manifest.json` schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

pub const USER_INPUTS_KEY: &str = "user_inputs.json";
pub const RESPONSE_KEY: &str = "response.json";
pub const MANIFEST_KEY: &str = "manifest.json";

/// Record of one run, written as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parameters: Parameters,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    pub stages: Vec<ManifestStage>,
    /// Extraction tier used per structured response field.
    #[serde(default)]
    pub extraction: IndexMap<String, String>,
}

/// Per-stage entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestStage {
    pub id: String,
    pub artifact_key: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Everything a finished scoping run produced.
#[derive(Debug)]
pub struct ScopingOutcome {
    pub run_dir: PathBuf,
    pub response: ScopingResponse,
    pub pipeline: PipelineResult,
    pub manifest: RunManifest,
}

/// Run the configured stages and assemble the response.
///
/// 1. Build the stage graph and runner
/// 2. Run the pipeline into `<output_root>/<run_id>/` (the runner rejects
///    invalid parameters before anything is written)
/// 3. Record the inputs
/// 4. Assemble and write `response.json` and `manifest.json`
#[instrument(skip_all, fields(output_root = %output_root.display()))]
pub async fn run_scoping(
    config: &AppConfig,
    parameters: &Parameters,
    generator: Arc<dyn TextGenerator>,
    output_root: &Path,
    progress: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<ScopingOutcome> {
    let graph = StageGraph::from_config(&config.stages)?;
    let runner = PipelineRunner::new(graph, generator)?
        .with_timeout(Duration::from_secs(config.defaults.stage_timeout_secs))
        .with_required_parameters(config.parameters.required.clone())
        .with_reporter(progress);

    let run_id = RunId::new();
    let store = FsStore::for_run(output_root, &run_id);
    info!(%run_id, path = %store.root().display(), "starting scoping run");

    let started_at = Utc::now();
    let pipeline = runner
        .run_as(run_id.clone(), parameters, &store, cancel)
        .await?;

    store.put(USER_INPUTS_KEY, &to_pretty_json(parameters)?)?;

    let assembled = assemble_response(parameters, &config.response, &store)?;
    store.put(RESPONSE_KEY, &to_pretty_json(&assembled.response)?)?;

    let manifest = RunManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        run_id,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        started_at,
        finished_at: Utc::now(),
        parameters: parameters.clone(),
        cancelled: pipeline.cancelled,
        first_error: pipeline.first_error.as_ref().map(ToString::to_string),
        stages: manifest_stages(&pipeline),
        extraction: assembled
            .strategies
            .iter()
            .map(|(field, strategy)| (field.to_string(), strategy.to_string()))
            .collect(),
    };
    store.put(MANIFEST_KEY, &to_pretty_json(&manifest)?)?;

    info!(
        run_id = %manifest.run_id,
        succeeded = pipeline.count(StageStatus::Succeeded),
        failed = pipeline.count(StageStatus::Failed),
        skipped = pipeline.count(StageStatus::Skipped),
        "scoping run complete"
    );

    Ok(ScopingOutcome {
        run_dir: store.root().to_path_buf(),
        response: assembled.response,
        pipeline,
        manifest,
    })
}

fn manifest_stages(pipeline: &PipelineResult) -> Vec<ManifestStage> {
    pipeline
        .stages
        .iter()
        .map(|report| ManifestStage {
            id: report.stage_id.clone(),
            artifact_key: report.artifact_key.clone(),
            status: report.outcome.status(),
            detail: report.outcome.detail(),
            elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            content_hash: pipeline
                .artifacts
                .get(&report.artifact_key)
                .map(|a| a.content_hash.clone()),
        })
        .collect()
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EascopeError::Storage(format!("failed to serialize JSON: {e}")))
}

/// Read and check the manifest of a finished run directory.
pub fn load_manifest(run_dir: &Path) -> Result<RunManifest> {
    let path = run_dir.join(MANIFEST_KEY);
    let content = std::fs::read_to_string(&path).map_err(|e| EascopeError::io(&path, e))?;

    let manifest: RunManifest = serde_json::from_str(&content)
        .map_err(|e| EascopeError::validation(format!("invalid manifest.json: {e}")))?;

    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(EascopeError::validation(format!(
            "unsupported schema_version: {} (expected {MANIFEST_SCHEMA_VERSION})",
            manifest.schema_version
        )));
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
