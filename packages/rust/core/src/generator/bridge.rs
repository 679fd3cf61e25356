//! Subprocess generator.
//!
//! Spawns a helper process and exchanges JSON-lines messages over its
//! stdin/stdout. The helper announces `ready`, answers each `generate`
//! request with `result` or `error`, and exits on `shutdown`.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use eascope_shared::{BridgeConfig, EascopeError, Parameters, Result};

use super::{TextGenerator, UpstreamArtifact};
use crate::prompt::PromptCatalog;

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// A generation task sent to the helper.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerationTask {
    pub stage_id: String,
    pub model: String,
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage {
    Generate { id: String, task: GenerationTask },
    Shutdown,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result { id: String, result: BridgeResult },
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

/// Generated text plus usage reported by the helper.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BridgeResult {
    pub text: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub latency_ms: u64,
}

fn bridge_error(msg: impl std::fmt::Display) -> EascopeError {
    EascopeError::Generation(format!("bridge: {msg}"))
}

// ---------------------------------------------------------------------------
// Process handle
// ---------------------------------------------------------------------------

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
    /// Id of a request whose reply has not been read yet. Set while a
    /// `send_task` is in flight; left set if that future was dropped.
    in_flight: Option<String>,
}

impl BridgeProcess {
    async fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(cmd = %config.cmd, args = ?config.args, "spawning generation bridge");

        let mut child = Command::new(&config.cmd)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                bridge_error(format!(
                    "failed to spawn: {e}. Is `{}` installed?",
                    config.cmd
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| bridge_error("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| bridge_error("failed to capture stdout"))?;

        let mut process = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
            in_flight: None,
        };

        match process.read_message().await? {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(process)
            }
            other => Err(bridge_error(format!("expected ready message, got {other:?}"))),
        }
    }

    async fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| bridge_error(format!("read error: {e}")))?;

        if n == 0 {
            return Err(bridge_error("closed stdout unexpectedly"));
        }

        serde_json::from_str(line.trim()).map_err(|e| {
            let shown: String = line.chars().take(200).collect();
            bridge_error(format!("invalid message: {e} (got: {shown})"))
        })
    }

    async fn write_message(&mut self, message: &RequestMessage) -> Result<()> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| bridge_error(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| bridge_error(format!("failed to write stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| bridge_error(format!("failed to flush stdin: {e}")))
    }

    /// Send one task. The outer error means the channel broke; the inner one
    /// is a failure the helper reported.
    async fn send_task(
        &mut self,
        task: GenerationTask,
    ) -> Result<std::result::Result<BridgeResult, String>> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);
        self.in_flight = Some(id.clone());

        self.write_message(&RequestMessage::Generate {
            id: id.clone(),
            task,
        })
        .await?;

        let reply = self.read_message().await?;
        self.in_flight = None;

        match reply {
            ResponseMessage::Result { id: resp_id, result } if resp_id == id => Ok(Ok(result)),
            ResponseMessage::Result { id: resp_id, .. } => Err(bridge_error(format!(
                "response id '{resp_id}' does not match request '{id}'"
            ))),
            ResponseMessage::Error { error, .. } => Ok(Err(error)),
            ResponseMessage::Ready => Err(bridge_error("unexpected ready message")),
        }
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.write_message(&RequestMessage::Shutdown).await {
            warn!(error = %e, "failed to send shutdown to bridge");
        }
        match self.child.wait().await {
            Ok(status) => info!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Generator backed by a long-lived helper process.
///
/// The process is spawned on first use and reused for every stage. Requests
/// are serialized: one in flight at a time. If a call is dropped mid-request
/// (a stage timeout), the next call replaces the process instead of reading
/// the stale reply.
pub struct BridgeGenerator {
    config: BridgeConfig,
    model: String,
    prompts: PromptCatalog,
    process: Mutex<Option<BridgeProcess>>,
}

impl BridgeGenerator {
    pub fn new(config: BridgeConfig, model: impl Into<String>, prompts: PromptCatalog) -> Self {
        Self {
            config,
            model: model.into(),
            prompts,
            process: Mutex::new(None),
        }
    }

    /// Ask the helper to exit, if it was started. A helper still working on
    /// an abandoned request is killed instead.
    pub async fn shutdown(&self) {
        match self.process.lock().await.take() {
            Some(process) if process.in_flight.is_some() => {
                warn!("killing bridge with an abandoned request");
                drop(process);
            }
            Some(process) => process.shutdown().await,
            None => {}
        }
    }
}

#[async_trait]
impl TextGenerator for BridgeGenerator {
    #[instrument(skip_all, fields(stage = stage_id))]
    async fn generate(
        &self,
        stage_id: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<String> {
        let prompt = self.prompts.render(stage_id, parameters, upstream)?;
        let task = GenerationTask {
            stage_id: stage_id.to_string(),
            model: self.model.clone(),
            system: prompt.system,
            prompt: prompt.user,
        };

        let mut guard = self.process.lock().await;
        if let Some(stale) = guard.as_ref().and_then(|p| p.in_flight.as_deref()) {
            // A cancelled call left its reply unread; the stream is out of sync.
            warn!(request = stale, "discarding bridge with an abandoned request");
            guard.take();
        }
        if guard.is_none() {
            *guard = Some(BridgeProcess::spawn(&self.config).await?);
        }
        let process = guard
            .as_mut()
            .ok_or_else(|| bridge_error("process not available"))?;

        match process.send_task(task).await {
            Ok(Ok(result)) => {
                debug!(
                    tokens_in = result.tokens_in,
                    tokens_out = result.tokens_out,
                    latency_ms = result.latency_ms,
                    "bridge generation complete"
                );
                Ok(result.text)
            }
            Ok(Err(message)) => Err(EascopeError::Generation(message)),
            Err(e) => {
                // The channel is out of sync; respawn on the next call.
                guard.take();
                Err(e)
            }
        }
    }
}
