use crate::traits::{
    ParamSpec, ParamType, Tool, ToolConfirmation, ToolInvocation, ToolKind, ToolResult,
    ToolSchema,
};
use crate::utils::resolve_path;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WriteFileParameters {
    path: String,
    content: String,
}

#[derive(Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it if it exists. Parent directories are created as needed."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::Fields(vec![
            ParamSpec::required(
                "path",
                ParamType::String,
                "Path to the file to write (relative to the working directory or absolute)",
            ),
            ParamSpec::required("content", ParamType::String, "Full content of the file"),
        ])
    }

    fn get_confirmation(&self, invocation: &ToolInvocation) -> Option<ToolConfirmation> {
        let path = invocation.params.get("path")?.as_str()?;
        let bytes = invocation
            .params
            .get("content")
            .and_then(|c| c.as_str())
            .map_or(0, str::len);

        Some(ToolConfirmation {
            tool_name: self.name().to_string(),
            kind: self.kind(),
            description: format!("Write {} bytes to {}", bytes, path),
            params: invocation.params.clone(),
        })
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let params: WriteFileParameters = invocation.parse()?;
        let path = resolve_path(&invocation.cwd, &params.path);
        let created = !path.exists();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        tokio::fs::write(&path, &params.content)
            .await
            .with_context(|| format!("Failed to write file {}", path.display()))?;

        let bytes = params.content.len();
        let verb = if created { "Created" } else { "Updated" };
        Ok(
            ToolResult::success(format!("{} {} ({} bytes)", verb, path.display(), bytes))
                .with_metadata("path", path.display().to_string())
                .with_metadata("bytes", bytes)
                .with_metadata("created", created),
        )
    }
}
