//! Stdio transport for MCP child-process servers
//!
//! [`StdioTransport`] spawns a child process and exchanges newline-delimited
//! JSON with it:
//!
//! - Outbound messages are written to the child's stdin, one JSON object
//!   per line.
//! - Inbound messages are read from the child's stdout, one JSON object per
//!   line (newline stripped before delivery).
//! - The child's stderr is logged via `tracing::debug!` and the last
//!   [`STDERR_TAIL_LINES`] lines are kept for error reports. Stderr output is
//!   never treated as an error condition.
//!
//! # Lifecycle
//!
//! [`StdioTransport::close`] closes the child's stdin, gives it
//! [`SHUTDOWN_GRACE`] to exit, then kills it. If the transport is dropped
//! without being closed, a best-effort SIGTERM (Unix) or `start_kill`
//! (non-Unix) is sent instead.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};
use crate::mcp::transport::Transport;

/// Number of stderr lines retained for diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long a child gets to exit after its stdin is closed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Bound on waiting for stderr EOF after the child is gone.
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// Stdio-based MCP transport that drives a child process.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use mcp_relay::mcp::transport::stdio::StdioTransport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = StdioTransport::spawn(
///     "uv".into(),
///     vec!["run".into(), "servers/utils/server.py".into()],
///     HashMap::new(),
///     None,
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StdioTransport {
    /// Program name, for error messages.
    program: String,
    /// Sender side of the stdin channel. Taken on close so the writer task
    /// drops the pipe and the child sees EOF.
    stdin_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Shared receiver for stdout lines (one JSON message per line).
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Last few stderr lines.
    stderr_tail: Arc<std::sync::Mutex<VecDeque<String>>>,
    /// Task filling `stderr_tail`; drained on close.
    stderr_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Handle to the spawned child process.
    child: Arc<Mutex<Child>>,
}

impl StdioTransport {
    /// Spawn a child process and wire up stdio pipes.
    ///
    /// The child inherits the parent environment with `env` applied on top.
    /// If `working_dir` is `Some`, the child's working directory is set
    /// accordingly.
    ///
    /// # Arguments
    ///
    /// * `executable` - Program to run; resolved through `PATH`.
    /// * `args` - Command-line arguments passed to the executable.
    /// * `env` - Environment overrides for the child process.
    /// * `working_dir` - Optional working directory for the child process.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::McpTransport`] if the process cannot be spawned
    /// or if the stdio pipes are unavailable.
    pub fn spawn(
        executable: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let program = executable.display().to_string();

        let mut cmd = Command::new(&executable);
        cmd.args(&args)
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            RelayError::McpTransport(format!("failed to spawn MCP server `{}`: {}", program, e))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RelayError::McpTransport("child stdin unavailable after spawn".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            RelayError::McpTransport("child stdout unavailable after spawn".into())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            RelayError::McpTransport("child stderr unavailable after spawn".into())
        })?;

        tracing::debug!(program = %program, pid = ?child.id(), "spawned MCP server");

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();
        let stderr_tail = Arc::new(std::sync::Mutex::new(VecDeque::with_capacity(
            STDERR_TAIL_LINES,
        )));

        // stdin_rx -> child stdin. Dropping `stdin` at the end closes the pipe.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // child stdout -> stdout_tx.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if stdout_tx.send(line.to_string()).is_err() {
                    break;
                }
            }
        });

        // child stderr -> tracing + tail buffer.
        let tail = Arc::clone(&stderr_tail);
        let log_program = program.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(
                    target: "mcp_relay::mcp::transport::stdio",
                    program = %log_program,
                    "mcp server stderr: {}",
                    line
                );
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        });

        Ok(Self {
            program,
            stdin_tx: std::sync::Mutex::new(Some(stdin_tx)),
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            stderr_tail,
            stderr_task: std::sync::Mutex::new(Some(stderr_task)),
            child: Arc::new(Mutex::new(child)),
        })
    }

    /// OS process id of the child, or `None` once it has been reaped.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.id()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: String) -> Result<()> {
        let guard = self
            .stdin_tx
            .lock()
            .map_err(|_| RelayError::McpTransport("stdin lock poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| RelayError::McpTransport(format!("`{}` is closed", self.program)))?;
        tx.send(message).map_err(|e| {
            anyhow::anyhow!(RelayError::McpTransport(format!(
                "stdin channel closed: {}",
                e
            )))
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    fn diagnostics(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn close(&self) -> Result<()> {
        let stdin_tx = self
            .stdin_tx
            .lock()
            .map_err(|_| RelayError::McpTransport("stdin lock poisoned".into()))?
            .take();
        drop(stdin_tx);

        let result = self.stop_child().await;
        self.drain_stderr().await;
        result
    }
}

impl StdioTransport {
    async fn stop_child(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if child.id().is_none() {
            return Ok(());
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(program = %self.program, %status, "MCP server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(RelayError::Io(e).into()),
            Err(_) => {
                tracing::debug!(program = %self.program, "MCP server ignored stdin EOF; killing");
                child.kill().await.map_err(|e| {
                    RelayError::McpTransport(format!("failed to kill `{}`: {}", self.program, e))
                })?;
                Ok(())
            }
        }
    }

    /// Wait for stderr to hit EOF so the tail holds the child's last words.
    async fn drain_stderr(&self) {
        let task = match self.stderr_task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            if tokio::time::timeout(STDERR_DRAIN, task).await.is_err() {
                tracing::debug!(program = %self.program, "stderr still open after exit");
            }
        }
    }
}

impl Drop for StdioTransport {
    /// Best-effort, non-blocking termination of a child that was never closed.
    fn drop(&mut self) {
        let Ok(mut child) = self.child.try_lock() else {
            return;
        };
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SAFETY: pid comes from a live tokio::process::Child that has not been reaped.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
        let _ = child.start_kill();
    }
}
