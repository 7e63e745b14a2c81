use anyhow::{anyhow, Context};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::CommandConfig;

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of one invocation of the processing command.
#[derive(Debug)]
pub enum CommandResult {
    /// The process ran to completion, with any exit status.
    Completed(CommandOutput),
    /// Killed after exceeding the configured bound.
    TimedOut(Duration),
    /// Could not be started or waited on.
    LaunchFailed(anyhow::Error),
}

#[cfg(test)]
impl CommandResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Completed(out) if out.status.success())
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            command: config.program.clone(),
            timeout: config.timeout(),
        }
    }

    /// Runs `command... <file_path>` and captures its output. The child is
    /// killed if it outlives the timeout.
    pub async fn run(&self, file_path: &Path) -> CommandResult {
        let Some((program, args)) = self.command.split_first() else {
            return CommandResult::LaunchFailed(anyhow!("Empty processing command"));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(file_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Err(_) => return CommandResult::TimedOut(self.timeout),
            Ok(result) => result,
        };

        let output = output
            .with_context(|| format!("Failed to execute processing command: {:?}", self.command));
        match output {
            Ok(output) => CommandResult::Completed(CommandOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) => CommandResult::LaunchFailed(e),
        }
    }
}
