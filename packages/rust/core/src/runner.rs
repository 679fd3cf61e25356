//! Sequential stage execution with dependency-context propagation.
//!
//! Stages run one at a time in topological order. Each stage receives the
//! artifacts of its direct dependencies, read back from the store. A stage
//! whose dependency did not succeed is skipped without calling the
//! generator; sibling branches keep running. Partial failure is reported in
//! the [`PipelineResult`], never as an `Err`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use eascope_shared::{Artifact, EascopeError, Parameters, Result, RunId};
use eascope_storage::ArtifactStore;

use crate::cancel::CancelToken;
use crate::generator::{TextGenerator, UpstreamArtifact};
use crate::graph::StageGraph;

/// Default per-stage deadline.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a stage failed. Cloneable so it can live in both the stage report
/// and `first_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("stage '{stage}' generation failed: {message}")]
    Generation { stage: String, message: String },

    #[error("stage '{stage}' timed out after {}s", after.as_secs_f64())]
    Timeout { stage: String, after: Duration },

    #[error("stage '{stage}' could not store its artifact: {message}")]
    Storage { stage: String, message: String },
}

impl StageError {
    pub fn stage(&self) -> &str {
        match self {
            Self::Generation { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::Storage { stage, .. } => stage,
        }
    }
}

/// Why a stage was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// This dependency failed or was itself skipped.
    Upstream { dependency: String },
    /// The run was cancelled before the stage started.
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream { dependency } => write!(f, "upstream stage '{dependency}' did not succeed"),
            Self::Cancelled => f.write_str("run cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Failed(StageError),
    Skipped(SkipReason),
}

impl StageOutcome {
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Succeeded => StageStatus::Succeeded,
            Self::Failed(_) => StageStatus::Failed,
            Self::Skipped(_) => StageStatus::Skipped,
        }
    }

    /// Failure or skip reason, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Succeeded => None,
            Self::Failed(e) => Some(e.to_string()),
            Self::Skipped(reason) => Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// What happened to one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage_id: String,
    pub artifact_key: String,
    pub outcome: StageOutcome,
    /// Time spent generating and storing. Zero for skipped stages.
    pub elapsed: Duration,
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: RunId,
    /// One report per stage, in execution order.
    pub stages: Vec<StageReport>,
    /// Artifacts written by succeeded stages, keyed by artifact key.
    pub artifacts: IndexMap<String, Artifact>,
    /// The first stage failure, if any.
    pub first_error: Option<StageError>,
    /// Whether cancellation stopped any stage from running.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl PipelineResult {
    pub fn outcome(&self, stage_id: &str) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|r| r.stage_id == stage_id)
            .map(|r| &r.outcome)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }

    /// Whether every stage succeeded.
    pub fn is_success(&self) -> bool {
        self.count(StageStatus::Succeeded) == self.stages.len()
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage's generator is invoked.
    fn stage_started(&self, stage_id: &str, index: usize, total: usize);
    /// Called once per stage, whatever its outcome.
    fn stage_finished(&self, report: &StageReport);
    /// Called when the run completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage_id: &str, _index: usize, _total: usize) {}
    fn stage_finished(&self, _report: &StageReport) {}
    fn done(&self, _result: &PipelineResult) {}
}

pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Notified once for every stage that succeeds.
///
/// Errors and panics are logged and otherwise ignored.
pub trait StageHook: Send + Sync {
    fn on_stage_complete(&self, stage_id: &str, artifact: &Artifact) -> HookResult;
}

impl<F> StageHook for F
where
    F: Fn(&str, &Artifact) -> HookResult + Send + Sync,
{
    fn on_stage_complete(&self, stage_id: &str, artifact: &Artifact) -> HookResult {
        self(stage_id, artifact)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes a validated [`StageGraph`].
pub struct PipelineRunner {
    graph: StageGraph,
    order: Vec<String>,
    generator: Arc<dyn TextGenerator>,
    stage_timeout: Duration,
    required_parameters: Vec<String>,
    hooks: Vec<Box<dyn StageHook>>,
    progress: Arc<dyn ProgressReporter>,
}

impl PipelineRunner {
    /// Create a runner. Fails if the graph cannot be ordered.
    pub fn new(graph: StageGraph, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let order = graph
            .topological_order()?
            .into_iter()
            .map(String::from)
            .collect();

        Ok(Self {
            graph,
            order,
            generator,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            required_parameters: Vec::new(),
            hooks: Vec::new(),
            progress: Arc::new(SilentProgress),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Parameter keys that must be present and non-blank for a run to start.
    pub fn with_required_parameters(mut self, keys: Vec<String>) -> Self {
        self.required_parameters = keys;
        self
    }

    pub fn with_reporter(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Register a completion hook.
    pub fn on_stage_complete(mut self, hook: impl StageHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Stage ids in execution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Run every stage once under a fresh run id.
    ///
    /// Returns `Err` only for invalid parameters or a broken internal
    /// invariant (a succeeded dependency with no stored artifact).
    pub async fn run(
        &self,
        parameters: &Parameters,
        store: &dyn ArtifactStore,
        cancel: &CancelToken,
    ) -> Result<PipelineResult> {
        self.run_as(RunId::new(), parameters, store, cancel).await
    }

    /// Like [`run`](Self::run), with a caller-chosen run id (for stores
    /// already scoped to that run).
    #[instrument(skip_all, fields(%run_id, stages = self.order.len()))]
    pub async fn run_as(
        &self,
        run_id: RunId,
        parameters: &Parameters,
        store: &dyn ArtifactStore,
        cancel: &CancelToken,
    ) -> Result<PipelineResult> {
        parameters.validate(&self.required_parameters)?;

        let start = Instant::now();
        let total = self.order.len();

        info!(%run_id, stages = total, "starting pipeline run");

        let mut statuses: HashMap<&str, StageStatus> = HashMap::with_capacity(total);
        let mut stages = Vec::with_capacity(total);
        let mut artifacts = IndexMap::new();
        let mut first_error: Option<StageError> = None;
        let mut cancelled = false;

        for (index, stage_id) in self.order.iter().enumerate() {
            let spec = self.graph.get(stage_id).ok_or_else(|| {
                EascopeError::validation(format!("stage '{stage_id}' missing from graph"))
            })?;

            let stage_start = Instant::now();
            let outcome = if cancel.is_cancelled() {
                cancelled = true;
                StageOutcome::Skipped(SkipReason::Cancelled)
            } else if let Some(dep) = spec
                .dependencies
                .iter()
                .find(|d| statuses.get(d.as_str()) != Some(&StageStatus::Succeeded))
            {
                StageOutcome::Skipped(SkipReason::Upstream {
                    dependency: dep.clone(),
                })
            } else {
                let upstream = self.gather_upstream(stage_id, store)?;
                self.progress.stage_started(stage_id, index, total);

                match self
                    .execute_stage(stage_id, &spec.artifact_key, parameters, &upstream, store)
                    .await
                {
                    Ok(artifact) => {
                        self.notify_hooks(stage_id, &artifact);
                        artifacts.insert(artifact.key.clone(), artifact);
                        StageOutcome::Succeeded
                    }
                    Err(e) => {
                        error!(stage = %stage_id, error = %e, "stage failed");
                        if first_error.is_none() {
                            first_error = Some(e.clone());
                        }
                        StageOutcome::Failed(e)
                    }
                }
            };

            if let StageOutcome::Skipped(reason) = &outcome {
                debug!(stage = %stage_id, %reason, "stage skipped");
            }

            statuses.insert(stage_id.as_str(), outcome.status());
            let report = StageReport {
                stage_id: stage_id.clone(),
                artifact_key: spec.artifact_key.clone(),
                elapsed: match outcome {
                    StageOutcome::Skipped(_) => Duration::ZERO,
                    _ => stage_start.elapsed(),
                },
                outcome,
            };
            self.progress.stage_finished(&report);
            stages.push(report);
        }

        let result = PipelineResult {
            run_id,
            stages,
            artifacts,
            first_error,
            cancelled,
            elapsed: start.elapsed(),
        };

        info!(
            run_id = %result.run_id,
            succeeded = result.count(StageStatus::Succeeded),
            failed = result.count(StageStatus::Failed),
            skipped = result.count(StageStatus::Skipped),
            cancelled = result.cancelled,
            elapsed_ms = result.elapsed.as_millis(),
            "pipeline run complete"
        );

        self.progress.done(&result);
        Ok(result)
    }

    /// Read every dependency's artifact, in declared order.
    fn gather_upstream(
        &self,
        stage_id: &str,
        store: &dyn ArtifactStore,
    ) -> Result<Vec<UpstreamArtifact>> {
        let spec = self
            .graph
            .get(stage_id)
            .ok_or_else(|| EascopeError::validation(format!("unknown stage '{stage_id}'")))?;

        spec.dependencies
            .iter()
            .map(|dep| {
                let key = self
                    .graph
                    .get(dep)
                    .map(|d| d.artifact_key.clone())
                    .ok_or_else(|| EascopeError::validation(format!("unknown stage '{dep}'")))?;

                match store.get(&key) {
                    Ok(content) => Ok(UpstreamArtifact {
                        stage_id: dep.clone(),
                        key,
                        content,
                    }),
                    Err(e) if e.is_not_found() => Err(EascopeError::MissingUpstreamArtifact {
                        stage: stage_id.to_string(),
                        dependency: dep.clone(),
                        key,
                    }),
                    Err(e) => Err(e),
                }
            })
            .collect()
    }

    async fn execute_stage(
        &self,
        stage_id: &str,
        artifact_key: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
        store: &dyn ArtifactStore,
    ) -> std::result::Result<Artifact, StageError> {
        let generation = tokio::time::timeout(
            self.stage_timeout,
            self.generator.generate(stage_id, parameters, upstream),
        )
        .await;

        let text = match generation {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(StageError::Generation {
                    stage: stage_id.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(StageError::Timeout {
                    stage: stage_id.to_string(),
                    after: self.stage_timeout,
                });
            }
        };

        store
            .put(artifact_key, &text)
            .map_err(|e| StageError::Storage {
                stage: stage_id.to_string(),
                message: e.to_string(),
            })?;

        info!(stage = %stage_id, key = %artifact_key, bytes = text.len(), "stage succeeded");
        Ok(Artifact::new(artifact_key, text, stage_id))
    }

    fn notify_hooks(&self, stage_id: &str, artifact: &Artifact) {
        for hook in &self.hooks {
            match catch_unwind(AssertUnwindSafe(|| hook.on_stage_complete(stage_id, artifact))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(stage = %stage_id, error = %e, "completion hook failed"),
                Err(_) => warn!(stage = %stage_id, "completion hook panicked"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use eascope_storage::MemoryStore;

    use super::*;
    use crate::generator::CannedGenerator;
    use crate::graph::StageSpec;

    const STAGES: [&str; 5] = [
        "project_intake",
        "regulatory_check",
        "pd_outline",
        "indigenous_nation_id",
        "next_steps",
    ];

    fn scoping_graph() -> StageGraph {
        StageGraph::from_config(&eascope_shared::default_stages()).unwrap()
    }

    fn all_text() -> CannedGenerator {
        STAGES
            .iter()
            .fold(CannedGenerator::new(), |g, id| g.with_text(id, format!("{id} output")))
    }

    fn runner(generator: Arc<CannedGenerator>) -> PipelineRunner {
        PipelineRunner::new(scoping_graph(), generator).unwrap()
    }

    fn statuses(result: &PipelineResult) -> Vec<(&str, StageStatus)> {
        result
            .stages
            .iter()
            .map(|r| (r.stage_id.as_str(), r.outcome.status()))
            .collect()
    }

    #[tokio::test]
    async fn all_stages_succeed_in_order() {
        let generator = Arc::new(all_text());
        let store = MemoryStore::new();
        let result = runner(generator.clone())
            .run(&Parameters::default(), &store, &CancelToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.first_error.is_none());
        assert!(!result.cancelled);
        assert_eq!(generator.called_stages(), STAGES);
        assert_eq!(
            result.artifacts.keys().collect::<Vec<_>>(),
            [
                "project_parameters.md",
                "regulatory_check.md",
                "pd_outline.md",
                "indigenous_nations.md",
                "next_steps.md"
            ]
        );
        assert_eq!(store.get("pd_outline.md").unwrap(), "pd_outline output");

        let artifact = &result.artifacts["next_steps.md"];
        assert_eq!(artifact.produced_by, "next_steps");
        assert_eq!(artifact.content_hash, eascope_shared::content_hash("next_steps output"));
    }

    #[tokio::test]
    async fn upstream_artifacts_are_passed_in_dependency_order() {
        let generator = Arc::new(all_text());
        runner(generator.clone())
            .run(&Parameters::default(), &MemoryStore::new(), &CancelToken::new())
            .await
            .unwrap();

        let calls = generator.calls();
        assert!(calls[0].1.is_empty());
        assert_eq!(calls[1].1, ["project_parameters.md"]);
        assert_eq!(
            calls[4].1,
            ["regulatory_check.md", "pd_outline.md", "indigenous_nations.md"]
        );
    }

    #[tokio::test]
    async fn root_failure_skips_everything_downstream() {
        let generator = Arc::new(all_text().with_failure("project_intake", "model unavailable"));
        let store = MemoryStore::new();
        let result = runner(generator.clone())
            .run(&Parameters::default(), &store, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.count(StageStatus::Failed), 1);
        assert_eq!(result.count(StageStatus::Skipped), 4);
        assert!(result.artifacts.is_empty());
        assert!(store.is_empty());
        assert_eq!(generator.called_stages(), ["project_intake"]);
        assert_eq!(
            result.outcome("regulatory_check"),
            Some(&StageOutcome::Skipped(SkipReason::Upstream {
                dependency: "project_intake".into()
            }))
        );
        assert_eq!(
            result.first_error.as_ref().map(StageError::stage),
            Some("project_intake")
        );
    }

    #[tokio::test]
    async fn sibling_failure_only_affects_its_dependents() {
        let generator = Arc::new(all_text().with_failure("pd_outline", "bad outline"));
        let result = runner(generator)
            .run(&Parameters::default(), &MemoryStore::new(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(
            statuses(&result),
            [
                ("project_intake", StageStatus::Succeeded),
                ("regulatory_check", StageStatus::Succeeded),
                ("pd_outline", StageStatus::Failed),
                ("indigenous_nation_id", StageStatus::Succeeded),
                ("next_steps", StageStatus::Skipped),
            ]
        );
        assert_eq!(result.artifacts.len(), 3);
        assert!(matches!(
            result.first_error,
            Some(StageError::Generation { ref stage, .. }) if stage == "pd_outline"
        ));
    }

    #[tokio::test]
    async fn first_error_is_the_earliest_failure() {
        let generator = Arc::new(
            all_text()
                .with_failure("regulatory_check", "first")
                .with_failure("indigenous_nation_id", "second"),
        );
        let result = runner(generator)
            .run(&Parameters::default(), &MemoryStore::new(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.count(StageStatus::Failed), 2);
        assert_eq!(
            result.first_error.as_ref().map(StageError::stage),
            Some("regulatory_check")
        );
    }

    #[tokio::test]
    async fn slow_stage_times_out_and_dependents_skip() {
        let generator = Arc::new(all_text().with_delay("regulatory_check", Duration::from_secs(5)));
        let result = runner(generator)
            .with_timeout(Duration::from_millis(50))
            .run(&Parameters::default(), &MemoryStore::new(), &CancelToken::new())
            .await
            .unwrap();

        assert!(matches!(
            result.outcome("regulatory_check"),
            Some(StageOutcome::Failed(StageError::Timeout { .. }))
        ));
        assert_eq!(
            result.outcome("pd_outline").map(StageOutcome::status),
            Some(StageStatus::Succeeded)
        );
        assert_eq!(
            result.outcome("next_steps").map(StageOutcome::status),
            Some(StageStatus::Skipped)
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_everything() {
        let generator = Arc::new(all_text());
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = runner(generator.clone())
            .run(&Parameters::default(), &MemoryStore::new(), &cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.count(StageStatus::Skipped), 5);
        assert!(result.first_error.is_none());
        assert!(generator.called_stages().is_empty());
        assert!(
            result
                .stages
                .iter()
                .all(|r| r.outcome == StageOutcome::Skipped(SkipReason::Cancelled))
        );
    }

    #[tokio::test]
    async fn cancellation_between_stages_returns_partial_result() {
        let generator = Arc::new(all_text());
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let result = runner(generator.clone())
            .on_stage_complete(move |stage: &str, _: &Artifact| -> HookResult {
                if stage == "regulatory_check" {
                    trigger.cancel();
                }
                Ok(())
            })
            .run(&Parameters::default(), &MemoryStore::new(), &cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(generator.called_stages(), ["project_intake", "regulatory_check"]);
        assert_eq!(result.artifacts.len(), 2);
        assert_eq!(result.count(StageStatus::Skipped), 3);
    }

    #[tokio::test]
    async fn hooks_fire_once_per_success_and_failures_are_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let generator = Arc::new(all_text().with_failure("indigenous_nation_id", "nope"));

        let result = runner(generator)
            .on_stage_complete(|_: &str, _: &Artifact| -> HookResult { Err("hook broke".into()) })
            .on_stage_complete(|_: &str, _: &Artifact| -> HookResult { panic!("hook panicked") })
            .on_stage_complete(move |stage: &str, artifact: &Artifact| -> HookResult {
                recorder
                    .lock()
                    .unwrap()
                    .push((stage.to_string(), artifact.key.clone()));
                Ok(())
            })
            .run(&Parameters::default(), &MemoryStore::new(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.count(StageStatus::Succeeded), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            [
                ("project_intake".to_string(), "project_parameters.md".to_string()),
                ("regulatory_check".to_string(), "regulatory_check.md".to_string()),
                ("pd_outline".to_string(), "pd_outline.md".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_parameters_fail_before_any_stage() {
        let generator = Arc::new(all_text());
        let err = runner(generator.clone())
            .with_required_parameters(vec!["project_name".into(), "scale".into()])
            .run(
                &Parameters::from_pairs([("project_name", "  ")]),
                &MemoryStore::new(),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EascopeError::Validation { .. }));
        assert!(generator.called_stages().is_empty());
    }

    /// Accepts writes but never keeps them.
    struct ForgetfulStore;

    impl ArtifactStore for ForgetfulStore {
        fn put(&self, _key: &str, _content: &str) -> Result<()> {
            Ok(())
        }
        fn get(&self, key: &str) -> Result<String> {
            Err(EascopeError::not_found(key))
        }
        fn exists(&self, _key: &str) -> bool {
            false
        }
        fn keys(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn vanished_upstream_artifact_is_fatal() {
        let generator = Arc::new(all_text());
        let err = runner(generator)
            .run(&Parameters::default(), &ForgetfulStore, &CancelToken::new())
            .await
            .unwrap_err();

        match err {
            EascopeError::MissingUpstreamArtifact {
                stage,
                dependency,
                key,
            } => {
                assert_eq!(stage, "regulatory_check");
                assert_eq!(dependency, "project_intake");
                assert_eq!(key, "project_parameters.md");
            }
            other => panic!("expected MissingUpstreamArtifact, got {other:?}"),
        }
    }

    /// Rejects every write.
    struct ReadOnlyStore;

    impl ArtifactStore for ReadOnlyStore {
        fn put(&self, _key: &str, _content: &str) -> Result<()> {
            Err(EascopeError::Storage("read-only".into()))
        }
        fn get(&self, key: &str) -> Result<String> {
            Err(EascopeError::not_found(key))
        }
        fn exists(&self, _key: &str) -> bool {
            false
        }
        fn keys(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn store_write_failure_fails_the_stage() {
        let generator = Arc::new(all_text());
        let result = runner(generator)
            .run(&Parameters::default(), &ReadOnlyStore, &CancelToken::new())
            .await
            .unwrap();

        assert!(matches!(
            result.outcome("project_intake"),
            Some(StageOutcome::Failed(StageError::Storage { .. }))
        ));
        assert_eq!(result.count(StageStatus::Skipped), 4);
    }

    #[test]
    fn runner_exposes_execution_order() {
        let mut graph = StageGraph::new();
        graph
            .add_stage(StageSpec::new("a", "a.md", Vec::<String>::new()))
            .unwrap();
        graph
            .add_stage(StageSpec::new("b", "b.md", ["a"]))
            .unwrap();
        let runner = PipelineRunner::new(graph, Arc::new(CannedGenerator::new())).unwrap();
        assert_eq!(runner.order(), ["a", "b"]);
    }
}
