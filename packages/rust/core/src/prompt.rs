//! Stage prompt templates and rendering.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use eascope_shared::{EascopeError, Parameters, Result, StageConfig};

use crate::generator::UpstreamArtifact;

/// Prompt templates for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub role: String,
    pub goal: String,
    pub description: String,
    pub expected_output: String,
}

impl From<&StageConfig> for PromptTemplate {
    fn from(stage: &StageConfig) -> Self {
        Self {
            role: stage.role.clone(),
            goal: stage.goal.clone(),
            description: stage.description.clone(),
            expected_output: stage.expected_output.clone(),
        }
    }
}

/// A prompt ready to send: persona plus task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Templates keyed by stage id.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptCatalog {
    pub fn from_stages(stages: &[StageConfig]) -> Self {
        let templates = stages
            .iter()
            .map(|s| (s.id.clone(), PromptTemplate::from(s)))
            .collect();
        Self { templates }
    }

    pub fn get(&self, stage_id: &str) -> Option<&PromptTemplate> {
        self.templates.get(stage_id)
    }

    /// Render the prompt for `stage_id`.
    ///
    /// Upstream artifacts are appended as labelled context blocks in the
    /// order given.
    pub fn render(
        &self,
        stage_id: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<RenderedPrompt> {
        let template = self.get(stage_id).ok_or_else(|| {
            EascopeError::Generation(format!("no prompt template for stage '{stage_id}'"))
        })?;

        let system = format!(
            "You are the {}.\nYour goal: {}",
            interpolate(&template.role, parameters),
            interpolate(&template.goal, parameters)
        );

        let mut user = interpolate(&template.description, parameters);
        user.push_str("\n\nExpected output: ");
        user.push_str(&interpolate(&template.expected_output, parameters));

        for artifact in upstream {
            user.push_str(&format!(
                "\n\n--- Context from {} ({}) ---\n{}",
                artifact.stage_id,
                artifact.key,
                artifact.content.trim()
            ));
        }

        Ok(RenderedPrompt { system, user })
    }
}

/// Replace `{name}` with the parameter `name`. Unknown names stay verbatim.
pub fn interpolate(template: &str, parameters: &Parameters) -> String {
    static PLACEHOLDER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            parameters
                .get(&caps[1])
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        Parameters::from_pairs([("project_name", "Kisgegas Cobalt"), ("scale", "large")])
    }

    #[test]
    fn interpolates_known_placeholders() {
        assert_eq!(
            interpolate("{project_name} is a {scale} project", &params()),
            "Kisgegas Cobalt is a large project"
        );
    }

    #[test]
    fn unknown_placeholders_stay_intact() {
        assert_eq!(
            interpolate("{project_name} near {river} {not a placeholder}", &params()),
            "Kisgegas Cobalt near {river} {not a placeholder}"
        );
    }

    #[test]
    fn render_appends_context_in_order() {
        let catalog = PromptCatalog::from_stages(&eascope_shared::default_stages());
        let upstream = vec![
            UpstreamArtifact {
                stage_id: "regulatory_check".into(),
                key: "regulatory_check.md".into(),
                content: "Provincial review likely.\n".into(),
            },
            UpstreamArtifact {
                stage_id: "pd_outline".into(),
                key: "pd_outline.md".into(),
                content: "**Project Overview**".into(),
            },
        ];

        let prompt = catalog.render("next_steps", &params(), &upstream).unwrap();
        assert!(prompt.system.starts_with("You are the EA Scoping Coordinator."));
        assert!(prompt.system.contains("Kisgegas Cobalt"));

        let reg = prompt.user.find("Context from regulatory_check").unwrap();
        let outline = prompt.user.find("Context from pd_outline").unwrap();
        assert!(reg < outline);
        assert!(prompt.user.contains("Provincial review likely."));
    }

    #[test]
    fn unknown_stage_is_a_generation_error() {
        let catalog = PromptCatalog::default();
        let err = catalog.render("missing", &params(), &[]).unwrap_err();
        assert!(matches!(err, EascopeError::Generation(_)));
    }
}
