//! Status source that runs the license server's status command.

use std::process::Stdio;

use async_trait::async_trait;
use olicense_pipeline::{RawStatus, StatusSource};
use olicense_status::StatusError;
use tokio::process::Command;

/// Runs a status command on every fetch and captures its stdout.
///
/// The command is executed directly, without a shell. A running command is
/// killed if the fetch is abandoned.
#[derive(Debug)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    description: String,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let description = if args.is_empty() {
            format!("command: {}", program)
        } else {
            format!("command: {} {}", program, args.join(" "))
        };
        Self {
            program,
            args,
            description,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl StatusSource for CommandSource {
    async fn fetch(&self) -> Result<RawStatus, StatusError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                StatusError::SourceUnavailable(format!("failed to run {}: {}", self.program, e))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let stderr = stderr.trim();
            let detail = if stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr)
            };
            return Err(StatusError::SourceUnavailable(format!(
                "{} exited with {}{}",
                self.program, output.status, detail
            )));
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(program = %self.program, stderr = %stderr.trim(), "status command wrote to stderr");
        }

        Ok(RawStatus::new(String::from_utf8_lossy(&output.stdout)))
    }

    fn description(&self) -> &str {
        &self.description
    }
}
