//! Subprocess sandbox backend.
//!
//! Every invocation gets a fresh runtime process and a private Unix socket.
//! The parent binds the socket, spawns the child with an explicit
//! environment, sends one invoke frame and waits for one terminal frame.
//! A single deadline covers the whole exchange: whichever of the terminal
//! frame, child exit and deadline comes first decides the result.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mimic_core::{ExecutionRequest, ExecutionResult};
use serde_json::Value;
use tokio::net::UnixListener;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::SandboxBackend;
use crate::ipc::{read_frame, write_frame, ChildMessage, ParentMessage};
use crate::logs::{relay, LogSink, Stream, TracingSink};
use crate::{SandboxConfig, SandboxError};

/// Detail reported when a child exits without a terminal message.
pub const EXITED_EARLY: &str = "process exited before completing";

/// Prefix of the detail reported when the terminal frame is unusable.
pub const INVALID_TERMINAL: &str = "invalid terminal message";

/// Runs each invocation in its own runtime subprocess.
#[derive(Clone)]
pub struct ProcessBackend {
    config: SandboxConfig,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for ProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBackend").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ProcessBackend {
    /// Create a backend that relays handler output through `tracing`.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a backend that relays handler output to `sink`.
    #[must_use]
    pub fn with_sink(config: SandboxConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    /// The configuration this backend spawns with.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn command(&self, request: &ExecutionRequest, socket_path: &Path) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&request.handler_path)
            .arg(&request.function_name)
            .arg(request.timeout.as_millis().to_string())
            .arg(socket_path)
            .env_clear()
            .envs(&self.config.base_env)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn(&self, request: &ExecutionRequest, socket_path: &Path) -> Result<Child, SandboxError> {
        self.command(request, socket_path).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::RuntimeNotFound {
                    program: self.config.program.clone(),
                }
            } else {
                SandboxError::SpawnFailed(format!("exec {}: {e}", self.config.program.display()))
            }
        })
    }

    /// Let a finished child exit on its own, killing it after the grace period.
    async fn reap(&self, child: &mut Child, invocation_id: Uuid) {
        match tokio::time::timeout(self.config.grace_period, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%invocation_id, %status, "sandbox exited"),
            Ok(Err(e)) => tracing::warn!(%invocation_id, error = %e, "waiting for sandbox failed"),
            Err(_) => terminate(child, invocation_id).await,
        }
    }

    /// Wait for the relay tasks so every output line is recorded before the
    /// result is returned.
    async fn drain(&self, relays: Vec<JoinHandle<()>>) {
        for handle in relays {
            if tokio::time::timeout(self.config.grace_period, handle).await.is_err() {
                tracing::debug!("handler output still open after grace period");
            }
        }
    }
}

#[async_trait]
impl SandboxBackend for ProcessBackend {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        let deadline = Instant::now() + request.timeout;
        let deadline_ms = epoch_deadline_ms(request.timeout);
        let invocation_id = Uuid::new_v4();

        tokio::fs::create_dir_all(&self.config.socket_dir).await?;
        let socket = SocketFile::bind(self.config.socket_dir.join(format!("{invocation_id}.sock")))?;

        tracing::debug!(
            %invocation_id,
            function = %request.function_name,
            handler = %request.handler_path.display(),
            timeout_ms = request.timeout.as_millis(),
            "spawning sandbox"
        );

        let mut child = self.spawn(&request, &socket.path)?;
        let mut relays = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            relays.push(relay(stdout, Stream::Stdout, request.function_name.clone(), Arc::clone(&self.sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            relays.push(relay(stderr, Stream::Stderr, request.function_name.clone(), Arc::clone(&self.sink)));
        }

        let context = handler_context(&request);
        let invoke = ParentMessage::Invoke {
            event: &request.event,
            context: &context,
            deadline_ms,
        };
        let outcome =
            tokio::time::timeout_at(deadline, converse(&socket.listener, &mut child, &invoke, invocation_id)).await;
        let result = match outcome {
            Ok(Ok(result)) => {
                self.reap(&mut child, invocation_id).await;
                result
            }
            Ok(Err(e)) => {
                terminate(&mut child, invocation_id).await;
                return Err(e);
            }
            Err(_) => {
                tracing::debug!(%invocation_id, function = %request.function_name, "sandbox timed out");
                terminate(&mut child, invocation_id).await;
                ExecutionResult::Timeout
            }
        };

        self.drain(relays).await;
        Ok(result)
    }

    async fn health_check(&self) -> Result<(), SandboxError> {
        which_binary(&self.config.program)?;
        tokio::fs::create_dir_all(&self.config.socket_dir).await?;
        Ok(())
    }
}

/// Run the invoke/terminal exchange with a spawned child.
///
/// Not bounded in time; the caller races it against the deadline and drops
/// it when the deadline wins, which discards any late terminal frame.
///
/// Once the child is connected every outcome is an [`ExecutionResult`]: a
/// frame that cannot be decoded or exceeds the size limit kills the child
/// and reports it as crashed.
async fn converse(
    listener: &UnixListener,
    child: &mut Child,
    invoke: &ParentMessage<'_>,
    invocation_id: Uuid,
) -> Result<ExecutionResult, SandboxError> {
    let mut stream = tokio::select! {
        accepted = listener.accept() => match accepted {
            Ok((stream, _)) => stream,
            Err(e) => return Err(SandboxError::Ipc(format!("accept: {e}"))),
        },
        status = child.wait() => return Ok(exited_early(status.ok())),
    };

    match write_frame(&mut stream, invoke).await {
        Ok(()) => {}
        Err(SandboxError::Protocol(detail)) => {
            tracing::warn!(%invocation_id, %detail, "invoke frame rejected");
            terminate(child, invocation_id).await;
            return Ok(ExecutionResult::ProcessCrashed(format!("invalid invoke message: {detail}")));
        }
        Err(e) => {
            tracing::debug!(%invocation_id, error = %e, "sandbox went away before the invoke frame was sent");
            return Ok(exited_early(child.wait().await.ok()));
        }
    }

    match read_frame::<_, ChildMessage>(&mut stream).await {
        Ok(Some(message)) => Ok(message.into()),
        Ok(None) | Err(SandboxError::Ipc(_)) => Ok(exited_early(child.wait().await.ok())),
        Err(SandboxError::Protocol(detail)) => {
            tracing::warn!(%invocation_id, %detail, "sandbox sent an invalid terminal frame");
            terminate(child, invocation_id).await;
            Ok(ExecutionResult::ProcessCrashed(format!("{INVALID_TERMINAL}: {detail}")))
        }
        Err(e) => Err(e),
    }
}

/// Epoch milliseconds at which an invocation started now with `timeout` ends.
fn epoch_deadline_ms(timeout: Duration) -> i64 {
    let budget = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(budget)
}

fn exited_early(status: Option<ExitStatus>) -> ExecutionResult {
    match status {
        Some(status) => ExecutionResult::ProcessCrashed(format!("{EXITED_EARLY} ({status})")),
        None => ExecutionResult::ProcessCrashed(EXITED_EARLY.to_owned()),
    }
}

async fn terminate(child: &mut Child, invocation_id: Uuid) {
    if let Err(e) = child.kill().await {
        tracing::warn!(%invocation_id, error = %e, "failed to kill sandbox");
    }
}

/// The request context plus the fields only the runtime knows.
fn handler_context(request: &ExecutionRequest) -> Value {
    let mut context = match &request.context {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    let request_id = context.get("requestId").cloned().unwrap_or(Value::Null);
    context.insert("functionName".to_owned(), Value::from(request.function_name.clone()));
    context.insert("memoryLimitInMB".to_owned(), Value::from(request.memory_size_mb));
    context.insert("awsRequestId".to_owned(), request_id);
    Value::Object(context)
}

/// A bound listener whose socket file is removed on drop.
struct SocketFile {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketFile {
    fn bind(path: PathBuf) -> Result<Self, SandboxError> {
        let listener =
            UnixListener::bind(&path).map_err(|e| SandboxError::Ipc(format!("bind {}: {e}", path.display())))?;
        Ok(Self { path, listener })
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Verify a binary exists either at the given path or in PATH.
pub(crate) fn which_binary(path: &Path) -> Result<(), SandboxError> {
    if path.components().count() > 1 {
        if path.exists() {
            return Ok(());
        }
        return Err(SandboxError::RuntimeNotFound { program: path.to_owned() });
    }

    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).is_file()))
        .unwrap_or(false);

    if found {
        Ok(())
    } else {
        Err(SandboxError::RuntimeNotFound { program: path.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn handler_context_adds_runtime_fields() {
        let request = ExecutionRequest::new(
            PathBuf::from("/srv/fn/index.js"),
            "handler",
            json!({}),
            json!({ "requestId": "abc", "stage": "dev" }),
            Duration::from_secs(1),
        )
        .with_memory_size(256);
        let context = handler_context(&request);
        assert_eq!(context["functionName"], "handler");
        assert_eq!(context["memoryLimitInMB"], 256);
        assert_eq!(context["awsRequestId"], "abc");
        assert_eq!(context["stage"], "dev");
    }

    #[test]
    fn exited_early_mentions_status_when_known() {
        match exited_early(None) {
            ExecutionResult::ProcessCrashed(detail) => assert_eq!(detail, EXITED_EARLY),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn which_binary_finds_sh_and_rejects_missing() {
        assert!(which_binary(Path::new("sh")).is_ok());
        assert!(matches!(
            which_binary(Path::new("/definitely/not/here")),
            Err(SandboxError::RuntimeNotFound { .. })
        ));
        assert!(matches!(
            which_binary(Path::new("mimic-no-such-runtime")),
            Err(SandboxError::RuntimeNotFound { .. })
        ));
    }

    #[test]
    fn epoch_deadline_is_timeout_after_now() {
        let before = Utc::now().timestamp_millis();
        let deadline = epoch_deadline_ms(Duration::from_millis(1500));
        let after = Utc::now().timestamp_millis();
        assert!(deadline >= before + 1500 && deadline <= after + 1500);
        assert_eq!(epoch_deadline_ms(Duration::MAX), i64::MAX);
    }

    /// Run `converse` against a peer that answers the invoke frame with `reply`.
    async fn converse_with_reply(tag: &str, reply: Vec<u8>) -> (Result<ExecutionResult, SandboxError>, Child) {
        let dir = std::env::temp_dir().join(format!("mimic-converse-{tag}-{}", Uuid::new_v4()));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            panic!("create {}: {e}", dir.display());
        }
        let socket = match SocketFile::bind(dir.join("peer.sock")) {
            Ok(socket) => socket,
            Err(e) => panic!("bind failed: {e}"),
        };
        let mut child = match Command::new("sh").args(["-c", "sleep 5"]).kill_on_drop(true).spawn() {
            Ok(child) => child,
            Err(e) => panic!("spawn failed: {e}"),
        };

        let path = socket.path.clone();
        let peer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut stream = match tokio::net::UnixStream::connect(&path).await {
                Ok(stream) => stream,
                Err(e) => panic!("connect failed: {e}"),
            };
            let invoke: Option<Value> = match read_frame(&mut stream).await {
                Ok(frame) => frame,
                Err(e) => panic!("invoke frame unreadable: {e}"),
            };
            assert!(invoke.is_some_and(|frame| frame["deadlineMs"].is_i64()));
            if let Err(e) = stream.write_all(&reply).await {
                panic!("reply failed: {e}");
            }
            stream
        });

        let event = json!({ "n": 1 });
        let context = json!({});
        let invoke = ParentMessage::Invoke {
            event: &event,
            context: &context,
            deadline_ms: epoch_deadline_ms(Duration::from_secs(5)),
        };
        let result = converse(&socket.listener, &mut child, &invoke, Uuid::new_v4()).await;
        let _stream = peer.await;
        drop(socket);
        let _ = std::fs::remove_dir_all(dir);
        (result, child)
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = match u32::try_from(body.len()) {
            Ok(len) => len.to_be_bytes().to_vec(),
            Err(e) => panic!("frame too large: {e}"),
        };
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn undecodable_terminal_frame_is_process_crashed() {
        let (result, mut child) = converse_with_reply("garbage", frame(b"not json")).await;
        match result {
            Ok(ExecutionResult::ProcessCrashed(detail)) => {
                assert!(detail.starts_with(INVALID_TERMINAL), "detail: {detail}");
                assert!(detail.contains("decode frame"), "detail: {detail}");
            }
            other => panic!("expected ProcessCrashed, got {other:?}"),
        }
        assert!(matches!(child.try_wait(), Ok(Some(_))), "child must be killed");
    }

    #[tokio::test]
    async fn oversized_terminal_frame_is_process_crashed() {
        let header = u32::try_from(crate::ipc::MAX_FRAME_LEN + 1).map_or([0xff; 4], u32::to_be_bytes);
        let (result, mut child) = converse_with_reply("oversized", header.to_vec()).await;
        match result {
            Ok(ExecutionResult::ProcessCrashed(detail)) => assert!(detail.contains("exceeds limit"), "detail: {detail}"),
            other => panic!("expected ProcessCrashed, got {other:?}"),
        }
        assert!(matches!(child.try_wait(), Ok(Some(_))), "child must be killed");
    }

    #[tokio::test]
    async fn valid_terminal_frame_is_returned() {
        let (result, _child) = converse_with_reply("ok", frame(br#"{"type":"success","payload":42}"#)).await;
        assert!(matches!(result, Ok(ExecutionResult::Success(ref v)) if *v == json!(42)), "got {result:?}");
    }

    #[tokio::test]
    async fn command_env_is_explicit() {
        let backend = ProcessBackend::new(SandboxConfig::new("sh").with_args(["-c", "exit 0"]));
        let mut env = std::collections::BTreeMap::new();
        env.insert("GREETING".to_owned(), "hi".to_owned());
        let request = ExecutionRequest::new(PathBuf::from("h.js"), "f", json!({}), json!({}), Duration::from_secs(1))
            .with_env(env);
        let command = backend.command(&request, Path::new("/tmp/x.sock"));
        let envs: Vec<_> = command.as_std().get_envs().collect();
        assert!(envs
            .iter()
            .any(|(k, v)| *k == "GREETING" && v.is_some_and(|v| v == "hi")));
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(args, vec!["-c", "exit 0", "h.js", "f", "1000", "/tmp/x.sock"]);
    }
}
