//! Subprocess-backed actions.
//!
//! Each invocation spawns the interpreter on the action's script file and
//! talks to it over stdin/stdout using the [`protocol`](super::protocol).
//! stderr is captured and attached to failures.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};

use super::executor::{ActionContext, Executable, ExecutionFailure, LoadError, ScriptLoader};
use super::protocol::{self, Step};
use crate::domain::Domain;

/// Maximum stderr captured per invocation (1 MiB).
const MAX_STDERR_BYTES: usize = 1024 * 1024;

/// Default wall-clock limit for a single invocation.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads script files to be run by an interpreter.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    interpreter: String,
    extension: String,
    check_args: Vec<String>,
    timeout: Duration,
}

impl ProcessLoader {
    /// Loader for `interpreter` scripts with the given file `extension`.
    /// No syntax check is run at load time.
    pub fn new(interpreter: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            extension: extension.into(),
            check_args: Vec::new(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Bash loader: `.sh` files, syntax-checked with `bash -n`.
    pub fn shell() -> Self {
        Self::new("bash", "sh").with_syntax_check(["-n"])
    }

    /// Run `interpreter <args> <path>` at load time; a non-zero exit rejects
    /// the script.
    pub fn with_syntax_check<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn syntax_check(&self, path: &Path) -> Result<(), LoadError> {
        let output = Command::new(&self.interpreter)
            .args(&self.check_args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| LoadError::Invalid(format!("Syntax check of {} timed out", path.display())))??;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(LoadError::Invalid(stderr))
        }
    }
}

#[async_trait]
impl ScriptLoader for ProcessLoader {
    fn extension(&self) -> &str {
        &self.extension
    }

    async fn load(&self, path: &Path) -> Result<Arc<dyn Executable>, LoadError> {
        if !tokio::fs::try_exists(path).await? || !path.is_file() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        if !self.check_args.is_empty() {
            self.syntax_check(path).await?;
        }
        Ok(Arc::new(ProcessScript {
            path: path.to_path_buf(),
            interpreter: self.interpreter.clone(),
            timeout: self.timeout,
        }))
    }
}

/// A loaded script file, run as a fresh subprocess per invocation.
#[derive(Debug, Clone)]
pub struct ProcessScript {
    path: PathBuf,
    interpreter: String,
    timeout: Duration,
}

/// How the command exchange ended.
enum Finish {
    /// Script sent `done` without an error.
    Done,
    /// Script closed stdout without sending `done`.
    Eof,
}

#[async_trait]
impl Executable for ProcessScript {
    async fn run(
        &self,
        context: &ActionContext,
        domain: &mut Domain,
    ) -> Result<(), ExecutionFailure> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.path)
            .env("ACTION_NAME", &context.action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child dies with the invocation (timeout or dropped request).
            .kill_on_drop(true);
        if let Some(dir) = self.path.parent() {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = cmd.spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionFailure::Protocol("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionFailure::Protocol("stdout not captured".to_string()))?;
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        // The init write shares the deadline: a payload larger than the pipe
        // buffer blocks until the script reads it.
        let init = protocol::init_line(context, domain.data()).to_string();
        let session = async {
            write_line(&mut stdin, &init).await;
            exchange(stdout, &mut stdin, domain, &context.action).await
        };
        let finish = match tokio::time::timeout(self.timeout, session).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecutionFailure::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        };
        drop(stdin);

        let remaining = self.timeout.saturating_sub(start.elapsed());
        let status = match tokio::time::timeout(remaining, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(ExecutionFailure::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr_bytes).trim().to_string();
        if !stderr.is_empty() {
            tracing::debug!(action = %context.action, %stderr, "Script stderr");
        }

        match (finish, status.success()) {
            (Finish::Done | Finish::Eof, true) => Ok(()),
            (_, false) => Err(ExecutionFailure::Exited {
                exit_code: status.code().unwrap_or(-1),
                stderr,
            }),
        }
    }
}

/// Read commands from the script until `done` or end of output.
async fn exchange<R>(
    stdout: R,
    stdin: &mut ChildStdin,
    domain: &mut Domain,
    action: &str,
) -> Result<Finish, ExecutionFailure>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('{') {
            tracing::debug!(action, output = line, "Script output");
            continue;
        }

        let command = serde_json::from_str(line)
            .map_err(|e| ExecutionFailure::Protocol(format!("Bad command {line}: {e}")))?;

        match protocol::apply(command, domain).await {
            Step::Continue => {}
            Step::Reply(reply) => {
                let encoded = serde_json::to_string(&reply)
                    .map_err(|e| ExecutionFailure::Protocol(e.to_string()))?;
                write_line(stdin, &encoded).await;
            }
            Step::Done(None) => return Ok(Finish::Done),
            Step::Done(Some(message)) => return Err(ExecutionFailure::Failed(message)),
        }
    }
    Ok(Finish::Eof)
}

/// Write one protocol line. Best-effort: a script that stopped reading
/// simply never sees the reply.
async fn write_line(stdin: &mut ChildStdin, line: &str) {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    if let Err(e) = stdin.write_all(buf.as_bytes()).await {
        tracing::debug!(error = %e, "Script stdin closed");
        return;
    }
    let _ = stdin.flush().await;
}

/// Read a stream to the end, keeping at most [`MAX_STDERR_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_STDERR_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
