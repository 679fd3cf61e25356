//! Application configuration for EAScope.
//!
//! User config lives at `~/.eascope/eascope.toml`.
//! CLI flags override config file values, which override defaults.
//! Stage definitions are typed records checked by [`validate_config`] at load
//! time, so a bad graph never reaches the runner.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EascopeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "eascope.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".eascope";

/// Keys the scoping run writes next to stage artifacts.
pub const RESERVED_KEYS: [&str; 3] = ["user_inputs.json", "response.json", "manifest.json"];

// ---------------------------------------------------------------------------
// Config structs (matching eascope.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Subprocess bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Caller parameter requirements.
    #[serde(default)]
    pub parameters: ParametersConfig,

    /// Stage definitions, in declaration order.
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    /// Which artifacts feed which response fields.
    #[serde(default)]
    pub response: ResponseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            openrouter: OpenRouterConfig::default(),
            bridge: BridgeConfig::default(),
            parameters: ParametersConfig::default(),
            stages: default_stages(),
            response: ResponseConfig::default(),
        }
    }
}

/// Which text generator backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// OpenRouter chat-completions API.
    OpenRouter,
    /// JSON-lines subprocess bridge.
    Bridge,
    /// Echo the rendered prompt back (dry run).
    Echo,
}

impl std::str::FromStr for GeneratorKind {
    type Err = EascopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openrouter" => Ok(Self::OpenRouter),
            "bridge" => Ok(Self::Bridge),
            "echo" => Ok(Self::Echo),
            other => Err(EascopeError::config(format!(
                "unknown generator '{other}': expected 'openrouter', 'bridge', or 'echo'"
            ))),
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OpenRouter => "openrouter",
            Self::Bridge => "bridge",
            Self::Echo => "echo",
        })
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory; each run writes to `<output_dir>/<run_id>/`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Per-stage generation deadline in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Generator used when the CLI does not pick one.
    #[serde(default = "default_generator")]
    pub generator: GeneratorKind,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            stage_timeout_secs: default_stage_timeout(),
            generator: default_generator(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_stage_timeout() -> u64 {
    300
}
fn default_generator() -> GeneratorKind {
    GeneratorKind::OpenRouter
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (the `/chat/completions` path is appended).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_temperature() -> f32 {
    0.2
}

/// `[bridge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge command (e.g., "bun").
    #[serde(default = "default_bridge_cmd")]
    pub cmd: String,

    /// Arguments passed to the command.
    #[serde(default = "default_bridge_args")]
    pub args: Vec<String>,

    /// Working directory for the subprocess.
    #[serde(default = "default_bridge_dir")]
    pub working_dir: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cmd: default_bridge_cmd(),
            args: default_bridge_args(),
            working_dir: default_bridge_dir(),
        }
    }
}

fn default_bridge_cmd() -> String {
    "bun".into()
}
fn default_bridge_args() -> Vec<String> {
    vec!["run".into(), "bridge/generate.ts".into()]
}
fn default_bridge_dir() -> String {
    ".".into()
}

/// `[parameters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersConfig {
    /// Keys every run must supply.
    #[serde(default = "default_required_parameters")]
    pub required: Vec<String>,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            required: default_required_parameters(),
        }
    }
}

fn default_required_parameters() -> Vec<String> {
    ["project_name", "location_region", "cobalt_type", "scale"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[[stages]]` entry: one pipeline stage and the prompt it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage id (lowercase snake case).
    pub id: String,
    /// Unique key the stage output is stored under.
    pub artifact_key: String,
    /// Ids of stages whose artifacts this stage reads. Must be declared earlier.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Persona the generator adopts.
    pub role: String,
    /// What the persona is trying to achieve.
    pub goal: String,
    /// Task prompt; `{parameter}` placeholders are interpolated.
    pub description: String,
    /// Description of the expected artifact shape.
    pub expected_output: String,
}

/// `[response]` section: artifact key feeding each response field.
///
/// A field set to `None` (or `""` in TOML) is never populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_regulatory_key")]
    pub regulatory_check: Option<String>,
    #[serde(default = "default_outline_key")]
    pub pd_outline: Option<String>,
    #[serde(default = "default_nations_key")]
    pub indigenous_nations: Option<String>,
    #[serde(default = "default_next_steps_key")]
    pub next_steps: Option<String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            regulatory_check: default_regulatory_key(),
            pd_outline: default_outline_key(),
            indigenous_nations: default_nations_key(),
            next_steps: default_next_steps_key(),
        }
    }
}

fn default_regulatory_key() -> Option<String> {
    Some("regulatory_check.md".into())
}
fn default_outline_key() -> Option<String> {
    Some("pd_outline.md".into())
}
fn default_nations_key() -> Option<String> {
    Some("indigenous_nations.md".into())
}
fn default_next_steps_key() -> Option<String> {
    Some("next_steps.md".into())
}

impl ResponseConfig {
    /// `(field name, artifact key)` for every populated field.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("regulatory_check", self.regulatory_check.as_deref()),
            ("pd_outline", self.pd_outline.as_deref()),
            ("indigenous_nations", self.indigenous_nations.as_deref()),
            ("next_steps", self.next_steps.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, key)| key.filter(|k| !k.is_empty()).map(|k| (field, k)))
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Default EA scoping stages
// ---------------------------------------------------------------------------

/// The five-stage EA scoping graph:
/// `project_intake -> {regulatory_check, pd_outline, indigenous_nation_id} -> next_steps`.
pub fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            id: "project_intake".into(),
            artifact_key: "project_parameters.md".into(),
            depends_on: vec![],
            role: "Mining Project Intake Specialist".into(),
            goal: "Capture and confirm the core parameters of {project_name}".into(),
            description: "Summarize the proposed project {project_name}: a {scale} \
                {cobalt_type} cobalt project in the {location_region} region. \
                Record the location, deposit type, scale, and any assumptions \
                needed for environmental assessment scoping."
                .into(),
            expected_output: "A markdown summary of the confirmed project parameters \
                and stated assumptions."
                .into(),
        },
        StageConfig {
            id: "regulatory_check".into(),
            artifact_key: "regulatory_check.md".into(),
            depends_on: vec!["project_intake".into()],
            role: "Environmental Assessment Regulatory Analyst".into(),
            goal: "Determine which assessment regimes apply to {project_name}".into(),
            description: "Using the confirmed project parameters, determine whether \
                {project_name} in {location_region} is likely reviewable under \
                provincial and federal environmental assessment legislation, citing \
                the relevant production thresholds for a {scale} operation."
                .into(),
            expected_output: "A markdown bullet list of applicable regimes, triggers, \
                and the reasoning for each."
                .into(),
        },
        StageConfig {
            id: "pd_outline".into(),
            artifact_key: "pd_outline.md".into(),
            depends_on: vec!["project_intake".into()],
            role: "Project Description Author".into(),
            goal: "Draft the outline of the initial project description".into(),
            description: "Draft an outline of the initial project description for \
                {project_name}. Use bold section headers on their own line, such as \
                **Project Overview** and **Potential Environmental Effects**, each \
                followed by bullet points in the form `* **Label:** detail`."
                .into(),
            expected_output: "A markdown outline with bold section headers followed \
                by labelled bullet points."
                .into(),
        },
        StageConfig {
            id: "indigenous_nation_id".into(),
            artifact_key: "indigenous_nations.md".into(),
            depends_on: vec!["project_intake".into()],
            role: "Indigenous Engagement Advisor".into(),
            goal: "Identify Indigenous Nations whose territory may be affected".into(),
            description: "Identify the Indigenous Nations whose asserted or \
                established territories overlap the {location_region} region where \
                {project_name} is proposed, and note engagement considerations."
                .into(),
            expected_output: "A markdown bullet list of Nations with a short note on \
                each."
                .into(),
        },
        StageConfig {
            id: "next_steps".into(),
            artifact_key: "next_steps.md".into(),
            depends_on: vec![
                "regulatory_check".into(),
                "pd_outline".into(),
                "indigenous_nation_id".into(),
            ],
            role: "EA Scoping Coordinator".into(),
            goal: "Recommend the next steps for {project_name}".into(),
            description: "Based on the regulatory check, project description outline, \
                and Nation identification, recommend the three most important next \
                steps for the proponent of {project_name}."
                .into(),
            expected_output: "A numbered list (`1.`, `2.`, `3.`) where the first line \
                of each item is the step and the following lines explain it."
                .into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

static STAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

static ARTIFACT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

/// Check a loaded config for structural problems.
///
/// Every problem is collected and reported in one `Config` error.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut problems: Vec<String> = Vec::new();

    if config.defaults.stage_timeout_secs == 0 {
        problems.push("defaults.stage_timeout_secs must be greater than zero".into());
    }

    if config.stages.is_empty() {
        problems.push("at least one [[stages]] entry is required".into());
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_keys: HashSet<&str> = HashSet::new();

    for stage in &config.stages {
        if !STAGE_ID_RE.is_match(&stage.id) {
            problems.push(format!(
                "stage id '{}' must be lowercase snake_case",
                stage.id
            ));
        }
        if !ARTIFACT_KEY_RE.is_match(&stage.artifact_key) || stage.artifact_key.contains("..") {
            problems.push(format!(
                "stage '{}': artifact_key '{}' is not a plain file name",
                stage.id, stage.artifact_key
            ));
        }
        if RESERVED_KEYS.contains(&stage.artifact_key.as_str()) {
            problems.push(format!(
                "stage '{}': artifact_key '{}' is reserved",
                stage.id, stage.artifact_key
            ));
        }
        if stage.description.trim().is_empty() {
            problems.push(format!("stage '{}': description is empty", stage.id));
        }

        for dep in &stage.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                problems.push(format!(
                    "stage '{}' depends on '{dep}', which is not declared before it",
                    stage.id
                ));
            }
        }

        if !seen_ids.insert(&stage.id) {
            problems.push(format!("duplicate stage id '{}'", stage.id));
        }
        if !seen_keys.insert(&stage.artifact_key) {
            problems.push(format!("duplicate artifact_key '{}'", stage.artifact_key));
        }
    }

    for (field, key) in config.response.entries() {
        if !seen_keys.contains(key) {
            problems.push(format!(
                "response.{field} refers to '{key}', which no stage produces"
            ));
        }
    }

    if let Err(e) = url::Url::parse(&config.openrouter.base_url) {
        problems.push(format!(
            "openrouter.base_url '{}' is not a valid URL: {e}",
            config.openrouter.base_url
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EascopeError::config(problems.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.eascope/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EascopeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.eascope/eascope.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EascopeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        EascopeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    validate_config(&config)?;
    tracing::debug!(?path, stages = config.stages.len(), "config loaded");
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EascopeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EascopeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EascopeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(EascopeError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        validate_config(&config).expect("defaults validate");
        assert_eq!(config.stages.len(), 5);
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("[[stages]]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.stage_timeout_secs, 300);
        assert_eq!(parsed.defaults.generator, GeneratorKind::OpenRouter);
        assert_eq!(parsed.stages[4].depends_on.len(), 3);
        assert_eq!(
            parsed.response.pd_outline.as_deref(),
            Some("pd_outline.md")
        );
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/runs"
generator = "echo"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/runs");
        assert_eq!(config.defaults.generator, GeneratorKind::Echo);
        assert_eq!(config.stages.len(), 5);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn custom_stages_replace_defaults() {
        let toml_str = r#"
[[stages]]
id = "draft"
artifact_key = "draft.md"
role = "Writer"
goal = "Write"
description = "Write about {project_name}"
expected_output = "Prose"

[response]
regulatory_check = "draft.md"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.stages.len(), 1);
        // Remaining response fields still point at the default keys.
        assert!(validate_config(&config).is_err());

        config.response.pd_outline = None;
        config.response.indigenous_nations = None;
        config.response.next_steps = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn validation_rejects_forward_dependency_and_duplicates() {
        let mut config = AppConfig::default();
        config.stages[0].depends_on = vec!["next_steps".into()];
        config.stages[2].artifact_key = "regulatory_check.md".into();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("not declared before it"));
        assert!(err.contains("duplicate artifact_key 'regulatory_check.md'"));
    }

    #[test]
    fn validation_rejects_path_like_keys_and_zero_timeout() {
        let mut config = AppConfig::default();
        config.defaults.stage_timeout_secs = 0;
        config.stages[1].artifact_key = "../escape.md".into();
        config.response.regulatory_check = None;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("stage_timeout_secs"));
        assert!(err.contains("not a plain file name"));
    }

    #[test]
    fn validation_rejects_reserved_key() {
        let mut config = AppConfig::default();
        config.stages[0].artifact_key = "manifest.json".into();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("reserved"));
    }

    #[test]
    fn generator_kind_parses() {
        assert_eq!("bridge".parse::<GeneratorKind>().unwrap(), GeneratorKind::Bridge);
        assert_eq!(GeneratorKind::OpenRouter.to_string(), "openrouter");
        assert!("gpt".parse::<GeneratorKind>().is_err());
    }

    #[test]
    fn load_config_from_missing_file_is_io_error() {
        let err = load_config_from(Path::new("/nonexistent/eascope.toml")).unwrap_err();
        assert!(matches!(err, EascopeError::Io { .. }));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "EASCOPE_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
