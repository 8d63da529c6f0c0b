//! Command backend: runs an external program per message.
//!
//! The user text is written to the program's stdin; whatever it prints on
//! stdout is the reply. Output that parses as JSON is handed back as a
//! structured [`Value`] (so `{"content": "..."}` works as well as plain
//! text). This is how agents written in other stacks are wired in.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::agent::{Argument, CallError, Method, Outcome, Value};
use crate::config::CommandConfig;

#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(config: &CommandConfig) -> Self {
        Self { program: config.program.clone(), args: config.args.clone() }
    }

    pub fn methods(&self) -> Vec<Method> {
        vec![Method::Run]
    }

    /// The process is spawned when the deferred outcome is awaited, and
    /// killed if that future is dropped (e.g. on timeout).
    pub async fn call(&self, method: &Method, arg: Argument) -> Result<Outcome, CallError> {
        if *method != Method::Run {
            return Err(CallError::Unsupported(method.to_string()));
        }
        let input = match arg {
            Argument::Text(s) => s,
            other => {
                return Err(CallError::Shape(format!("run takes text, got {}", other.shape())));
            }
        };

        let program = self.program.clone();
        let args = self.args.clone();
        Ok(Outcome::Deferred(Box::pin(async move {
            run_program(&program, &args, &input).await.map(Outcome::Ready)
        })))
    }
}

async fn run_program(program: &str, args: &[String], input: &str) -> Result<Value, CallError> {
    debug!(program, args = ?args, input_len = input.len(), "spawning agent command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CallError::Failed(format!("failed to spawn '{program}': {e}")))?;

    // Feed stdin concurrently with reading stdout, so a program that writes
    // before it has read all its input cannot fill the pipe and stall.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_owned();
        let program = program.to_owned();
        tokio::spawn(async move {
            // A program that never reads stdin closes the pipe early; not an error.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(%program, error = %e, "agent command did not read stdin");
            }
        })
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CallError::Failed(format!("failed to wait for '{program}': {e}")))?;
    if let Some(writer) = writer {
        let _ = writer.await;
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(program, status = %output.status, "agent command failed");
        return Err(CallError::Failed(format!(
            "'{program}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(parse_output(&String::from_utf8_lossy(&output.stdout)))
}

/// JSON when it parses, plain text otherwise.
fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) if json.is_object() || json.is_array() => Value::from(json),
        _ => Value::Text(trimmed.to_string()),
    }
}
