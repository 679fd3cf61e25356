//! Text generation boundary.
//!
//! The pipeline treats generation as a black box: given a stage id, the run
//! parameters and the artifacts of the stage's dependencies, return text.
//!
//! Adapters:
//! - [`OpenRouterGenerator`]: chat completions over HTTP
//! - [`BridgeGenerator`]: JSON-lines subprocess
//! - [`EchoGenerator`]: returns the rendered prompt (dry runs)
//! - [`CannedGenerator`]: fixed responses per stage (tests)

mod bridge;
mod openrouter;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use eascope_shared::{EascopeError, Parameters, Result};

use crate::prompt::PromptCatalog;

pub use bridge::BridgeGenerator;
pub use openrouter::OpenRouterGenerator;

/// An artifact handed to a stage as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamArtifact {
    /// Stage that produced it.
    pub stage_id: String,
    pub key: String,
    pub content: String,
}

/// Produces the text artifact for one stage.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        stage_id: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Echo
// ---------------------------------------------------------------------------

/// Returns the rendered prompt instead of calling a model.
#[derive(Debug, Clone)]
pub struct EchoGenerator {
    prompts: PromptCatalog,
}

impl EchoGenerator {
    pub fn new(prompts: PromptCatalog) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        stage_id: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<String> {
        let prompt = self.prompts.render(stage_id, parameters, upstream)?;
        Ok(format!("{}\n\n{}\n", prompt.system, prompt.user))
    }
}

// ---------------------------------------------------------------------------
// Canned
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Canned {
    Text(String),
    Fail(String),
}

/// Fixed response or failure per stage id, with an optional delay.
///
/// Stages with nothing registered fail. Every call is recorded.
#[derive(Debug, Default)]
pub struct CannedGenerator {
    responses: HashMap<String, Canned>,
    delays: HashMap<String, Duration>,
    calls: std::sync::Mutex<Vec<(String, Vec<String>)>>,
}

impl CannedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, stage_id: &str, text: impl Into<String>) -> Self {
        self.responses
            .insert(stage_id.to_string(), Canned::Text(text.into()));
        self
    }

    pub fn with_failure(mut self, stage_id: &str, message: impl Into<String>) -> Self {
        self.responses
            .insert(stage_id.to_string(), Canned::Fail(message.into()));
        self
    }

    pub fn with_delay(mut self, stage_id: &str, delay: Duration) -> Self {
        self.delays.insert(stage_id.to_string(), delay);
        self
    }

    /// `(stage id, upstream keys)` for every call so far, in call order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Stage ids called so far, in call order.
    pub fn called_stages(&self) -> Vec<String> {
        self.calls().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(
        &self,
        stage_id: &str,
        _parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                stage_id.to_string(),
                upstream.iter().map(|u| u.key.clone()).collect(),
            ));
        }

        if let Some(delay) = self.delays.get(stage_id) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(stage_id) {
            Some(Canned::Text(text)) => Ok(text.clone()),
            Some(Canned::Fail(message)) => Err(EascopeError::Generation(message.clone())),
            None => Err(EascopeError::Generation(format!(
                "no canned response for stage '{stage_id}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_rendered_prompt() {
        let generator = EchoGenerator::new(PromptCatalog::from_stages(
            &eascope_shared::default_stages(),
        ));
        let params = Parameters::from_pairs([("project_name", "Kisgegas")]);
        let text = generator
            .generate("project_intake", &params, &[])
            .await
            .unwrap();
        assert!(text.contains("Kisgegas"));
        assert!(text.contains("Expected output:"));
    }

    #[tokio::test]
    async fn canned_records_calls_and_fails_unknown_stages() {
        let generator = CannedGenerator::new()
            .with_text("a", "alpha")
            .with_failure("b", "boom");
        let params = Parameters::default();

        assert_eq!(generator.generate("a", &params, &[]).await.unwrap(), "alpha");
        let err = generator.generate("b", &params, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "generation error: boom");
        assert!(generator.generate("c", &params, &[]).await.is_err());
        assert_eq!(generator.called_stages(), ["a", "b", "c"]);
    }
}
