//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use eascope_core::{
    BridgeGenerator, CancelToken, EchoGenerator, OpenRouterGenerator, PipelineResult,
    ProgressReporter, PromptCatalog, StageGraph, StageOutcome, StageReport, StageStatus,
    TextGenerator, load_manifest, run_scoping,
};
use eascope_markdown::{extract_sections, extract_steps};
use eascope_shared::{
    AppConfig, GeneratorKind, Parameters, ProjectInput, init_config, load_config,
    load_config_from, validate_api_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// EAScope: environmental assessment scoping for proposed mining projects.
#[derive(Parser)]
#[command(
    name = "eascope",
    version,
    about = "Run the EA scoping stages for a proposed project and emit a structured response.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.eascope/eascope.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a scoping assessment and print the response as JSON.
    Run(RunArgs),

    /// Print the stage execution order and dependencies.
    Stages,

    /// Run a Markdown extractor over a file and print the result.
    Extract {
        #[command(subcommand)]
        kind: ExtractKind,
    },

    /// Summarize a finished run directory.
    Inspect {
        /// Run directory (`<output_dir>/<run_id>`).
        run_dir: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct RunArgs {
    /// JSON file with project_name, location_region, cobalt_type, and scale.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    project_name: Option<String>,

    #[arg(long)]
    location_region: Option<String>,

    #[arg(long)]
    cobalt_type: Option<String>,

    #[arg(long)]
    scale: Option<String>,

    /// Extra parameter as key=value (repeatable).
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Output root; the run writes to `<out>/<run_id>/`.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Generator: openrouter, bridge, or echo.
    #[arg(short, long)]
    generator: Option<GeneratorKind>,

    /// Model id passed to the generator.
    #[arg(long)]
    model: Option<String>,

    /// Per-stage timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

/// Extractor selection.
#[derive(Subcommand)]
pub(crate) enum ExtractKind {
    /// Bold-header sections.
    Sections { file: PathBuf },
    /// Numbered steps.
    Steps { file: PathBuf },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout
/// stays valid JSON.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["eascope", "eascope_core", "eascope_markdown", "eascope_storage", "eascope_shared"]
        .map(|target| format!("{target}={level}"))
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Stages => cmd_stages(config_path),
        Command::Extract { kind } => cmd_extract(kind),
        Command::Inspect { run_dir } => cmd_inspect(&run_dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// The generator picked for a run. Bridge runs keep a typed handle so the
/// helper process can be shut down afterwards.
enum ActiveGenerator {
    Bridge(Arc<BridgeGenerator>),
    Other(Arc<dyn TextGenerator>),
}

impl ActiveGenerator {
    fn build(kind: GeneratorKind, config: &AppConfig) -> Result<Self> {
        let prompts = PromptCatalog::from_stages(&config.stages);
        Ok(match kind {
            GeneratorKind::OpenRouter => {
                validate_api_key(config)?;
                Self::Other(Arc::new(OpenRouterGenerator::from_config(
                    &config.openrouter,
                    prompts,
                )?))
            }
            GeneratorKind::Bridge => Self::Bridge(Arc::new(BridgeGenerator::new(
                config.bridge.clone(),
                config.openrouter.default_model.clone(),
                prompts,
            ))),
            GeneratorKind::Echo => Self::Other(Arc::new(EchoGenerator::new(prompts))),
        })
    }

    fn handle(&self) -> Arc<dyn TextGenerator> {
        match self {
            Self::Bridge(bridge) => Arc::clone(bridge) as Arc<dyn TextGenerator>,
            Self::Other(generator) => Arc::clone(generator),
        }
    }

    async fn shutdown(&self) {
        if let Self::Bridge(bridge) = self {
            bridge.shutdown().await;
        }
    }
}

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;

    // Flags override the config file.
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err(eyre!("--timeout must be greater than zero"));
        }
        config.defaults.stage_timeout_secs = timeout;
    }
    if let Some(model) = &args.model {
        config.openrouter.default_model = model.clone();
    }
    let kind = args.generator.unwrap_or(config.defaults.generator);
    let output_root = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let parameters = collect_parameters(&args)?;
    let generator = ActiveGenerator::build(kind, &config)?;

    info!(generator = %kind, out = %output_root.display(), "starting assessment");

    let cancel = CancelToken::new();
    let reporter = Arc::new(CliProgress::new());
    let result = tokio::select! {
        result = run_scoping(
            &config,
            &parameters,
            generator.handle(),
            &output_root,
            reporter.clone(),
            &cancel,
        ) => Some(result),
        () = watch_interrupts(&cancel) => None,
    };

    generator.shutdown().await;
    let Some(result) = result else {
        reporter.abandon();
        return Err(eyre!(
            "run aborted; partial artifacts are left under {}",
            output_root.display()
        ));
    };
    let outcome = result?;

    println!("{}", serde_json::to_string_pretty(&outcome.response)?);

    let pipeline = &outcome.pipeline;
    eprintln!();
    eprintln!("  Run:        {}", pipeline.run_id);
    eprintln!("  Path:       {}", outcome.run_dir.display());
    eprintln!(
        "  Stages:     {} succeeded, {} failed, {} skipped",
        pipeline.count(StageStatus::Succeeded),
        pipeline.count(StageStatus::Failed),
        pipeline.count(StageStatus::Skipped),
    );
    if let Some(error) = &pipeline.first_error {
        eprintln!("  First error: {error}");
    }
    if pipeline.cancelled {
        eprintln!("  Cancelled:  yes");
    }
    eprintln!("  Time:       {:.1}s", pipeline.elapsed.as_secs_f64());
    eprintln!();

    Ok(())
}

/// The first Ctrl-C cancels the run between stages. Resolves on the second
/// one, which aborts the stage in flight.
async fn watch_interrupts(cancel: &CancelToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    warn!("interrupt received, stopping after the current stage (Ctrl-C again to abort)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    warn!("second interrupt received, aborting");
}

/// Merge `--input`, the named flags, and `--param` pairs. Later sources win.
fn collect_parameters(args: &RunArgs) -> Result<Parameters> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    if let Some(path) = &args.input {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let input: ProjectInput = serde_json::from_str(&content)
            .wrap_err_with(|| format!("invalid project input in {}", path.display()))?;
        pairs.extend(
            Parameters::from(input)
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
    }

    let named = [
        ("project_name", &args.project_name),
        ("location_region", &args.location_region),
        ("cobalt_type", &args.cobalt_type),
        ("scale", &args.scale),
    ];
    for (key, value) in named {
        if let Some(value) = value {
            pairs.push((key.to_string(), value.clone()));
        }
    }

    for raw in &args.params {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| eyre!("invalid --param '{raw}': expected KEY=VALUE"))?;
        pairs.push((key.trim().to_string(), value.to_string()));
    }

    Ok(Parameters::from_pairs(pairs))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.abandon_with_message("aborted");
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage_id: &str, index: usize, total: usize) {
        self.spinner
            .set_message(format!("[{}/{total}] {stage_id}", index + 1));
    }

    fn stage_finished(&self, report: &StageReport) {
        let line = match &report.outcome {
            StageOutcome::Succeeded => format!(
                "  ✓ {} ({:.1}s)",
                report.stage_id,
                report.elapsed.as_secs_f64()
            ),
            StageOutcome::Failed(e) => format!("  ✗ {}: {e}", report.stage_id),
            StageOutcome::Skipped(reason) => format!("  - {}: {reason}", report.stage_id),
        };
        self.spinner.println(line);
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// stages / extract / inspect
// ---------------------------------------------------------------------------

fn cmd_stages(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let graph = StageGraph::from_config(&config.stages)?;

    for (position, id) in graph.topological_order()?.into_iter().enumerate() {
        let Some(spec) = graph.get(id) else { continue };
        let deps = if spec.dependencies.is_empty() {
            "-".to_string()
        } else {
            spec.dependencies.join(", ")
        };
        println!(
            "{:>2}. {:<24} → {:<28} after: {deps}",
            position + 1,
            spec.id,
            spec.artifact_key
        );
    }
    Ok(())
}

fn cmd_extract(kind: ExtractKind) -> Result<()> {
    let (file, output) = match kind {
        ExtractKind::Sections { file } => {
            let text = read_text(&file)?;
            let extraction = extract_sections(&text);
            let value = serde_json::json!({
                "strategy": extraction.strategy,
                "sections": extraction.items,
            });
            (file, value)
        }
        ExtractKind::Steps { file } => {
            let text = read_text(&file)?;
            let extraction = extract_steps(&text);
            let value = serde_json::json!({
                "strategy": extraction.strategy,
                "steps": extraction.items,
            });
            (file, value)
        }
    };

    info!(file = %file.display(), strategy = %output["strategy"], "extraction complete");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn cmd_inspect(run_dir: &Path) -> Result<()> {
    let manifest = load_manifest(run_dir)?;

    println!();
    println!("  Run:      {}", manifest.run_id);
    println!("  Version:  {}", manifest.tool_version);
    println!("  Started:  {}", manifest.started_at.to_rfc3339());
    println!(
        "  Duration: {:.1}s",
        (manifest.finished_at - manifest.started_at).num_milliseconds() as f64 / 1000.0
    );
    for (key, value) in manifest.parameters.iter() {
        println!("  {key}: {value}");
    }
    if manifest.cancelled {
        println!("  Cancelled: yes");
    }
    println!();

    for stage in &manifest.stages {
        match &stage.detail {
            Some(detail) => println!("  {:<10} {:<24} {detail}", stage.status, stage.id),
            None => println!(
                "  {:<10} {:<24} {} ms",
                stage.status, stage.id, stage.elapsed_ms
            ),
        }
    }

    if !manifest.extraction.is_empty() {
        println!();
        for (field, strategy) in &manifest.extraction {
            println!("  {field}: {strategy} extraction");
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
