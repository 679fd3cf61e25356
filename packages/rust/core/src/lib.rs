//! Core pipeline for EAScope.
//!
//! - [`graph`]: stage dependency graph and ordering
//! - [`runner`]: sequential execution, skip propagation, hooks
//! - [`generator`]: the text-generation boundary and its adapters
//! - [`prompt`]: stage prompt templates
//! - [`response`]: structured response assembly
//! - [`scoping`]: end-to-end run into a run-scoped directory

pub mod cancel;
pub mod generator;
pub mod graph;
pub mod prompt;
pub mod response;
pub mod runner;
pub mod scoping;

pub use cancel::CancelToken;
pub use generator::{
    BridgeGenerator, CannedGenerator, EchoGenerator, OpenRouterGenerator, TextGenerator,
    UpstreamArtifact,
};
pub use graph::{StageGraph, StageSpec};
pub use prompt::{PromptCatalog, RenderedPrompt};
pub use response::{AssembledResponse, NextStep, ScopingResponse, assemble_response};
pub use runner::{
    HookResult, PipelineResult, PipelineRunner, ProgressReporter, SilentProgress, SkipReason,
    StageError, StageHook, StageOutcome, StageReport, StageStatus,
};
pub use scoping::{RunManifest, ScopingOutcome, load_manifest, run_scoping};
