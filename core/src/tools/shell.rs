use crate::traits::{
    ParamSpec, ParamType, Tool, ToolConfirmation, ToolInvocation, ToolKind, ToolResult,
    ToolSchema,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Deserialize)]
struct ShellParameters {
    command: String,
    timeout_secs: Option<u64>,
}

#[derive(Default)]
pub struct ShellTool;

impl ShellTool {
    pub fn new() -> Self {
        Self
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let mut text = stdout.trim_end().to_string();

    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("stderr:\n");
        text.push_str(stderr.trim_end());
    }
    text
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return its output"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::Fields(vec![
            ParamSpec::required("command", ParamType::String, "Shell command to execute"),
            ParamSpec::optional(
                "timeout_secs",
                ParamType::Integer,
                "Seconds before the command is killed (default 60)",
            )
            .with_minimum(1),
        ])
    }

    fn get_confirmation(&self, invocation: &ToolInvocation) -> Option<ToolConfirmation> {
        let command = invocation.params.get("command")?.as_str()?;
        Some(ToolConfirmation {
            tool_name: self.name().to_string(),
            kind: self.kind(),
            description: format!("Run `{}`", command),
            params: invocation.params.clone(),
        })
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let params: ShellParameters = invocation.parse()?;
        let timeout_secs = params
            .timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&invocation.cwd)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
            Ok(output) => output.with_context(|| format!("Failed to spawn `{}`", params.command))?,
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "Command timed out after {}s",
                    timeout_secs
                ))
                .with_metadata("timeout_secs", timeout_secs));
            }
        };

        let text = combine_output(&output.stdout, &output.stderr);
        let exit_code = output.status.code();

        if output.status.success() {
            let text = if text.is_empty() {
                "(no output)".to_string()
            } else {
                text
            };
            return Ok(ToolResult::success(text).with_metadata("exit_code", exit_code));
        }

        Ok(
            ToolResult::error(format!("Command failed with status: {}", output.status))
                .with_output(text)
                .with_metadata("exit_code", exit_code),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn invocation(dir: &TempDir, params: Value) -> ToolInvocation {
        ToolInvocation::new(params.as_object().cloned().unwrap(), dir.path())
    }

    #[tokio::test]
    async fn runs_in_invocation_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let result = ShellTool::new()
            .execute(invocation(&dir, json!({"command": "ls"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "marker.txt");
        assert_eq!(result.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn failure_keeps_output() {
        let dir = TempDir::new().unwrap();
        let result = ShellTool::new()
            .execute(invocation(
                &dir,
                json!({"command": "echo partial; echo broken >&2; exit 3"}),
            ))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.output, "partial\nstderr:\nbroken");
        assert_eq!(result.metadata["exit_code"], 3);
        assert!(result.to_model_output().starts_with("Error: Command failed"));
    }

    #[tokio::test]
    async fn times_out() {
        let dir = TempDir::new().unwrap();
        let result = ShellTool::new()
            .execute(invocation(&dir, json!({"command": "sleep 5", "timeout_secs": 1})))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Command timed out after 1s"));
    }
}
