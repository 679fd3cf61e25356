//! Structured scoping response built from stored artifacts.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use eascope_markdown::{SectionMap, Step, Strategy, extract_sections, extract_steps, normalize_text};
use eascope_shared::{Parameters, ResponseConfig, Result};
use eascope_storage::ArtifactStore;

/// One recommended next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub step: String,
    pub explanation: String,
}

impl From<Step> for NextStep {
    fn from(step: Step) -> Self {
        Self {
            step: step.title,
            explanation: step.explanation,
        }
    }
}

/// The response returned to callers. A field is `null` when the artifact
/// feeding it was never produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScopingResponse {
    pub project_parameters: Parameters,
    pub regulatory_check: Option<String>,
    pub pd_outline: Option<SectionMap>,
    pub indigenous_nations: Option<String>,
    pub next_steps: Option<Vec<NextStep>>,
}

/// A response plus the extraction tier used for each structured field.
#[derive(Debug, Clone)]
pub struct AssembledResponse {
    pub response: ScopingResponse,
    pub strategies: Vec<(&'static str, Strategy)>,
}

/// Read the configured artifacts and shape them into a [`ScopingResponse`].
///
/// Missing artifacts leave their field empty; any other store error is
/// returned.
#[instrument(skip_all)]
pub fn assemble_response(
    parameters: &Parameters,
    layout: &ResponseConfig,
    store: &dyn ArtifactStore,
) -> Result<AssembledResponse> {
    let mut response = ScopingResponse {
        project_parameters: parameters.clone(),
        regulatory_check: None,
        pd_outline: None,
        indigenous_nations: None,
        next_steps: None,
    };
    let mut strategies = Vec::new();

    for (field, key) in layout.entries() {
        let Some(content) = store.get_opt(key)? else {
            debug!(field, key, "artifact absent, leaving field empty");
            continue;
        };

        match field {
            "regulatory_check" => response.regulatory_check = Some(normalize_text(&content)),
            "indigenous_nations" => response.indigenous_nations = Some(normalize_text(&content)),
            "pd_outline" => {
                let extraction = extract_sections(&content);
                note_strategy(field, extraction.strategy);
                strategies.push((field, extraction.strategy));
                response.pd_outline = Some(extraction.into_inner());
            }
            "next_steps" => {
                let extraction = extract_steps(&content);
                note_strategy(field, extraction.strategy);
                strategies.push((field, extraction.strategy));
                response.next_steps = Some(
                    extraction
                        .into_inner()
                        .into_iter()
                        .map(NextStep::from)
                        .collect(),
                );
            }
            _ => {}
        }
    }

    Ok(AssembledResponse {
        response,
        strategies,
    })
}

fn note_strategy(field: &str, strategy: Strategy) {
    match strategy {
        Strategy::Primary => debug!(field, "structured extraction succeeded"),
        Strategy::Fallback => warn!(field, "primary extraction found nothing, used line scan"),
        Strategy::Empty => warn!(field, "no structure found in artifact"),
    }
}
