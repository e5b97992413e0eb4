//! Safe execution layer: run the wrapped tool with a fully built argv and a bounded lifetime.
//! No shell is used; arguments are passed as a list to avoid injection.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::GatewayError;

/// Exit code reported when the child is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the child could not be spawned at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Characters kept per stream in the caller-visible result.
pub const MAX_OUTPUT_CHARS: usize = 30_000;

/// Bytes captured per stream while the child runs; the rest is read and discarded.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

/// How long to wait for pipes to close after the child itself has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Completed,
    Failed,
    Timeout,
}

impl ExecStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Raw result of running the tool once.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout_raw: String,
    pub stderr_raw: String,
    pub status: ExecStatus,
}

impl ExecutionResult {
    /// Result for a child that never started.
    pub fn spawn_failure(err: &GatewayError) -> Self {
        Self {
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            stdout_raw: String::new(),
            stderr_raw: format!("{}\n", err),
            status: ExecStatus::Failed,
        }
    }
}

/// Runs one tool invocation. `argv` excludes the program itself.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<ExecutionResult, GatewayError>;
}

/// Spawns the configured binary directly (never through a shell).
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    env: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
        }
    }

    /// Extra environment on top of the inherited one.
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<ExecutionResult, GatewayError> {
        let mut child = Command::new(&self.program)
            .args(argv)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::Execution(format!("spawning {}: {}", self.program.display(), e))
            })?;
        log::debug!("spawned {} (pid {:?})", self.program.display(), child.id());

        let stdout_buf = Capture::new();
        let stderr_buf = Capture::new();
        let mut stdout_task = child.stdout.take().map(|s| stdout_buf.spawn_reader(s));
        let mut stderr_task = child.stderr.take().map(|s| stderr_buf.spawn_reader(s));

        let (exit_code, status) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(waited) => {
                let code = match waited {
                    Ok(st) => st.code().unwrap_or(1),
                    Err(e) => {
                        log::warn!("waiting on child failed: {}", e);
                        1
                    }
                };
                // Pipes may be held open by grandchildren; bound the drain.
                let drain = async {
                    if let Some(t) = stdout_task.as_mut() {
                        let _ = t.await;
                    }
                    if let Some(t) = stderr_task.as_mut() {
                        let _ = t.await;
                    }
                };
                let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;
                let status = if code == 0 {
                    ExecStatus::Completed
                } else {
                    ExecStatus::Failed
                };
                (code, status)
            }
            Err(_) => {
                log::warn!(
                    "{} exceeded timeout of {} ms, killing",
                    self.program.display(),
                    timeout.as_millis()
                );
                if let Err(e) = child.kill().await {
                    log::warn!("killing timed-out child failed: {}", e);
                }
                (TIMEOUT_EXIT_CODE, ExecStatus::Timeout)
            }
        };

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            task.abort();
        }

        Ok(ExecutionResult {
            exit_code,
            stdout_raw: stdout_buf.into_string(),
            stderr_raw: stderr_buf.into_string(),
            status,
        })
    }
}

/// Bounded byte buffer filled by a reader task; readable at any time (e.g. after a kill).
#[derive(Clone)]
struct Capture {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn spawn_reader<R>(&self, mut pipe: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = self.clone();
        tokio::spawn(async move {
            let mut chunk = vec![0u8; 16 * 1024];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.push(&chunk[..n]),
                }
            }
        })
    }

    fn push(&self, bytes: &[u8]) {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let room = MAX_CAPTURE_BYTES.saturating_sub(g.len());
        g.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn into_string(self) -> String {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let text = String::from_utf8_lossy(&g).into_owned();
        text
    }
}

/// Cap `text` at `max_chars` characters, appending a marker with the number removed.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n\n[output truncated: {} characters removed]",
        kept,
        total - max_chars
    )
}
