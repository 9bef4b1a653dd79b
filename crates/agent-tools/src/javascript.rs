//! JavaScript Execution Tool
//!
//! Runs model-supplied code as a function body in a separate interpreter
//! process. The process gets the code on stdin and nothing else: its
//! environment is cleared except for `PATH`, its heap is capped, stdout is
//! capped, and it is killed on timeout or when the call is dropped.
//!
//! This is process isolation only, not a hardened sandbox. The interpreter
//! still has whatever filesystem and network access the host user has.

use std::process::Stdio;

use agent_core::tool::{ParameterSchema, Tool, ToolDeclaration};
use agent_core::Result as CoreResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};

use crate::argument_text;
use crate::config::SandboxConfig;
use crate::error::{Result, ToolError};

/// Reads the code from stdin, runs it via `new Function` and prints a JSON
/// envelope as the final stdout line.
const HARNESS: &str = r"
let src = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { src += chunk; });
process.stdin.on('end', () => {
  let out;
  try {
    const result = new Function(src)();
    out = { ok: true, result: typeof result === 'object' ? JSON.stringify(result) : String(result) };
  } catch (e) {
    out = { ok: false, errorName: (e && e.name) || 'Error', errorMessage: (e && e.message) || String(e) };
  }
  process.stdout.write('\n' + JSON.stringify(out) + '\n');
});
";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error_name: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// `executeJavascript(code)`
pub struct JavaScriptTool {
    config: SandboxConfig,
}

impl JavaScriptTool {
    pub const fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Run `code` and return its stringified result
    pub async fn execute(&self, code: &str) -> Result<String> {
        let mut command = Command::new(&self.config.program);
        command
            .arg(format!("--max-old-space-size={}", self.config.max_heap_mb))
            .arg("-e")
            .arg(HARNESS)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ToolError::Sandbox(format!("failed to start {}: {e}", self.config.program)))?;
        tracing::debug!(program = %self.config.program, bytes = code.len(), "Executing JavaScript");

        let stdin = child.stdin.take();
        let limit = self.config.max_output_bytes;
        let collected = tokio::time::timeout(self.config.timeout, async {
            tokio::try_join!(feed_code(stdin, code), collect_output(&mut child, limit))
                .map(|((), stdout)| stdout)
        })
        .await;

        let stdout = match collected {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Err(_) => {
                let _ = child.start_kill();
                tracing::warn!(timeout_ms = self.config.timeout.as_millis(), "JavaScript execution timed out");
                return Err(ToolError::Timeout(self.config.timeout));
            }
        };

        parse_envelope(&stdout)
    }
}

async fn feed_code(stdin: Option<ChildStdin>, code: &str) -> Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    // An interpreter that exits without reading closes the pipe early
    match stdin.write_all(code.as_bytes()).await {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        other => other?,
    }
    Ok(())
}

async fn collect_output(child: &mut Child, limit: usize) -> Result<Vec<u8>> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::Sandbox("stdout not captured".into()))?;

    let mut buf = Vec::new();
    (&mut stdout)
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(ToolError::OutputLimit(limit));
    }

    let status = child.wait().await?;
    if !status.success() && buf.is_empty() {
        return Err(ToolError::Sandbox(format!("interpreter exited with {status}")));
    }
    Ok(buf)
}

fn parse_envelope(stdout: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ToolError::Sandbox("interpreter produced no result".into()))?;

    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|e| ToolError::Sandbox(format!("unreadable result: {e}")))?;

    if envelope.ok {
        Ok(envelope.result.unwrap_or_else(|| "undefined".into()))
    } else {
        Err(ToolError::Execution {
            name: envelope.error_name.unwrap_or_else(|| "Error".into()),
            message: envelope.error_message.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Tool for JavaScriptTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "executeJavascript".into(),
            description: "Execute a string of JavaScript code in a sandboxed environment.".into(),
            parameters: vec![ParameterSchema::new(
                "code",
                "string",
                "The JavaScript code to execute.",
                true,
            )],
        }
    }

    async fn invoke(&self, argument: Value) -> CoreResult<String> {
        let code = argument_text(&argument);
        Ok(match self.execute(&code).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "JavaScript execution failed");
                format!(
                    "Error executing code: {} - {}",
                    e.execution_name(),
                    e.execution_message()
                )
            }
        })
    }
}
