//! External compiler invocation.
//!
//! Each invocation serializes the document to its own scoped temp file,
//! spawns `<executable> <mode> <path>`, and captures both output channels
//! under a timeout. Downstream interpretation only ever sees one string:
//! stdout when the compiler exited cleanly, stderr for every kind of
//! failure. The two channels are deliberately interchangeable — a crash
//! message parses the same way a diagnostic line does, and an empty one
//! reads as "no problems". Failures therefore never propagate; they only
//! show up in the log channel.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::settings::Settings;

/// Mode flag passed as the compiler's first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Analyze,
    Fmt,
}

impl Mode {
    #[must_use]
    pub fn flag(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Fmt => "fmt",
        }
    }
}

/// Ways an invocation can fail before any output exists to interpret.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("compiler executable '{0}' not found on PATH")]
    NotFound(String),
    #[error("could not create scratch file for compiler input")]
    Scratch(#[source] std::io::Error),
    #[error("failed to spawn compiler")]
    Spawn(#[source] std::io::Error),
}

/// Raw capture of one compiler run.
#[derive(Debug)]
struct Capture {
    clean_exit: bool,
    stdout: String,
    stderr: String,
}

impl Capture {
    /// Stdout on success, stderr on failure or timeout.
    fn relevant_channel(&self) -> &str {
        if self.clean_exit {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run the compiler over `text` and return the captured output, already
/// stripped of its trailing sentinel.
///
/// Every failure degrades to a string: stderr when the process ran at all,
/// the empty string when it never did. Callers interpret whatever comes
/// back; they cannot tell a clean "no problems" from a tool failure, which
/// is the availability trade this server makes.
pub async fn invoke(text: &str, mode: Mode, settings: &Settings) -> String {
    match run(text, mode, settings).await {
        Ok(capture) => {
            if !capture.clean_exit {
                tracing::warn!(
                    mode = mode.flag(),
                    stderr_bytes = capture.stderr.len(),
                    "compiler run failed; interpreting stderr in place of stdout"
                );
            }
            strip_sentinel(capture.relevant_channel()).to_string()
        }
        Err(e) => {
            tracing::warn!(mode = mode.flag(), error = %e, "compiler invocation failed");
            String::new()
        }
    }
}

async fn run(text: &str, mode: Mode, settings: &Settings) -> Result<Capture, InvokeError> {
    let executable = which::which(&settings.executable_path)
        .map_err(|_| InvokeError::NotFound(settings.executable_path.clone()))?;

    let scratch = tempfile::NamedTempFile::new().map_err(InvokeError::Scratch)?;
    if let Err(e) = tokio::fs::write(scratch.path(), text).await {
        // Keep going: the compiler sees an empty file and the request still
        // resolves to best-effort output rather than a protocol error.
        tracing::warn!(
            path = %scratch.path().display(),
            error = %e,
            "failed to write document to scratch file"
        );
    }

    let mut child = Command::new(&executable)
        .arg(mode.flag())
        .arg(scratch.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(InvokeError::Spawn)?;

    // Drain both pipes concurrently with the wait; a compiler that fills a
    // pipe buffer must not deadlock against us.
    let stdout_task = drain(child.stdout.take());
    let stderr_task = drain(child.stderr.take());

    let limit = Duration::from_millis(settings.max_compiler_invocation_time);
    let clean_exit = match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed waiting for compiler exit");
            false
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = settings.max_compiler_invocation_time,
                executable = %executable.display(),
                "compiler timed out; killing"
            );
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "kill after timeout failed");
            }
            let _ = child.wait().await;
            false
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(Capture {
        clean_exit,
        stdout,
        stderr,
    })
}

fn drain<P>(pipe: Option<P>) -> tokio::task::JoinHandle<String>
where
    P: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "reading compiler output pipe failed");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Strip the trailing sentinel the compiler appends to its output: `\r\n`,
/// or a bare `\n` from tools that rewrite line endings. This is a suffix
/// match, never a positional byte count, so short outputs pass through
/// untouched.
fn strip_sentinel(output: &str) -> &str {
    output
        .strip_suffix("\r\n")
        .or_else(|| output.strip_suffix('\n'))
        .unwrap_or(output)
}
