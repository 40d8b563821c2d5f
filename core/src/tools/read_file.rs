use crate::traits::{Tool, ToolInvocation, ToolKind, ToolResult, ToolSchema};
use crate::utils::{count_tokens, is_binary_file, resolve_path, truncate_text};
use anyhow::Context;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const MAX_OUTPUT_TOKENS: usize = 25_000;

fn default_offset() -> usize {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileParameters {
    /// Path to the file to read (relative to the working directory or absolute).
    pub path: String,
    /// Line number to start reading from (1-based). Defaults to 1.
    #[serde(default = "default_offset")]
    #[schemars(range(min = 1))]
    pub offset: usize,
    /// Maximum number of lines to read. Reads to the end of the file when omitted.
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub limit: Option<usize>,
}

#[derive(Default)]
pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb > 1.0 {
        format!("{:.2} MB", mb)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Decodes UTF-8, falling back to Latin-1 so every byte maps to a char.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Returns the file content with line numbers. \
         For large files, use offset and limit to read specific portions. \
         Cannot read binary files (images, executables, etc.)."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from_type::<ReadFileParameters>()
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let params: ReadFileParameters = invocation.parse()?;
        if params.offset == 0 || params.limit == Some(0) {
            return Ok(ToolResult::error("offset and limit must be at least 1"));
        }

        let path = resolve_path(&invocation.cwd, &params.path);

        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            return Ok(ToolResult::error(format!("File not found: {}", path.display())));
        };

        if !metadata.is_file() {
            return Ok(ToolResult::error(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let file_size = metadata.len();
        if file_size > MAX_FILE_SIZE {
            return Ok(ToolResult::error(format!(
                "File is too large ({}). Max file size is {} MB.",
                format_size(file_size),
                MAX_FILE_SIZE / (1024 * 1024)
            )));
        }

        if is_binary_file(&path) {
            return Ok(ToolResult::error(format!(
                "Cannot read binary file: {} ({})\nThis tool only reads text files.",
                path.display(),
                format_size(file_size)
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        let content = decode(bytes);
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let path_str = path.display().to_string();

        if total_lines == 0 {
            return Ok(ToolResult::success("File is empty.")
                .with_metadata("path", path_str)
                .with_metadata("total_lines", 0));
        }

        let start_idx = params.offset - 1;
        if start_idx >= total_lines {
            return Ok(ToolResult::error(format!(
                "Offset {} is past the end of the file ({} lines)",
                params.offset, total_lines
            )));
        }
        let end_idx = params
            .limit
            .map_or(total_lines, |limit| total_lines.min(start_idx.saturating_add(limit)));

        let mut output = lines[start_idx..end_idx]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:6}|{}", start_idx + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        let truncated = count_tokens(&output) > MAX_OUTPUT_TOKENS;
        if truncated {
            output = truncate_text(
                &output,
                MAX_OUTPUT_TOKENS,
                &format!("\n... [truncated {} total lines]", total_lines),
            );
        }

        if start_idx > 0 || end_idx < total_lines {
            output = format!(
                "Showing lines {} to {} of {}\n\n{}",
                start_idx + 1,
                end_idx,
                total_lines,
                output
            );
        }

        Ok(ToolResult::success(output)
            .with_truncated(truncated)
            .with_metadata("path", path_str)
            .with_metadata("total_lines", total_lines)
            .with_metadata("shown_start", start_idx + 1)
            .with_metadata("shown_end", end_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};
    use tempfile::TempDir;

    fn invocation(dir: &TempDir, params: Value) -> ToolInvocation {
        ToolInvocation::new(params.as_object().cloned().unwrap_or_default(), dir.path())
    }

    #[tokio::test]
    async fn numbers_every_line() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\n").unwrap();

        let result = ReadFileTool::new()
            .execute(invocation(&dir, json!({"path": "a.txt"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "     1|alpha\n     2|beta");
        assert_eq!(result.metadata["total_lines"], 2);
        assert_eq!(result.metadata["shown_end"], 2);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn partial_view_gets_header() {
        let dir = TempDir::new().unwrap();
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("b.txt"), body).unwrap();

        let result = ReadFileTool::new()
            .execute(invocation(&dir, json!({"path": "b.txt", "offset": 3, "limit": 2})))
            .await
            .unwrap();

        assert_eq!(
            result.output,
            "Showing lines 3 to 4 of 10\n\n     3|line 3\n     4|line 4"
        );
        assert_eq!(result.metadata["shown_start"], 3);
        assert_eq!(result.metadata["shown_end"], 4);
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();

        let result = ReadFileTool::new()
            .execute(invocation(&dir, json!({"path": "empty.txt"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "File is empty.");
    }

    #[tokio::test]
    async fn rejects_missing_directory_and_binary() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("img.bin"), [0x89, b'P', b'N', b'G', 0x00]).unwrap();
        let tool = ReadFileTool::new();

        let missing = tool
            .execute(invocation(&dir, json!({"path": "nope.txt"})))
            .await
            .unwrap();
        assert!(missing.error.unwrap().starts_with("File not found"));

        let directory = tool.execute(invocation(&dir, json!({"path": "."}))).await.unwrap();
        assert!(directory.error.unwrap().starts_with("Path is not a file"));

        let binary = tool
            .execute(invocation(&dir, json!({"path": "img.bin"})))
            .await
            .unwrap();
        assert!(binary.error.unwrap().starts_with("Cannot read binary file"));
    }

    #[tokio::test]
    async fn offset_past_end_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.txt"), "one\n").unwrap();

        let result = ReadFileTool::new()
            .execute(invocation(&dir, json!({"path": "c.txt", "offset": 5})))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn huge_limit_reads_to_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("d.txt"), "one\ntwo\nthree\n").unwrap();
        let tool = ReadFileTool::new();
        let params = json!({"path": "d.txt", "offset": 2, "limit": u64::MAX});

        assert!(tool.validate_params(params.as_object().unwrap()).is_empty());
        let result = tool.execute(invocation(&dir, params)).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            result.output,
            "Showing lines 2 to 3 of 3\n\n     2|two\n     3|three"
        );
        assert_eq!(result.metadata["shown_end"], 3);
    }

    #[test]
    fn schema_requires_only_path() {
        let tool = ReadFileTool::new();
        let errors = tool.validate_params(&Map::new());
        assert_eq!(errors, vec!["path: field required".to_string()]);

        let spec = tool.spec();
        assert_eq!(spec.parameters["type"], "object");
        assert_eq!(spec.parameters["required"], json!(["path"]));
        assert!(spec.parameters["properties"]["offset"].is_object());
        assert!(
            tool.validate_params(json!({"path": "x", "offset": "two"}).as_object().unwrap())
                .iter()
                .any(|e| e.starts_with("offset:"))
        );
    }
}
