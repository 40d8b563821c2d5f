use crate::config::Config;
use crate::tools::{ReadFileTool, ShellTool, WriteFileTool};
use crate::traits::{Tool, ToolConfirmation, ToolInvocation, ToolResult, ToolSpec};
use crate::utils::{count_tokens, truncate_text};
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 50_000;

pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    max_output_tokens: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_output_budget(DEFAULT_MAX_OUTPUT_TOKENS)
    }

    pub fn with_output_budget(max_output_tokens: usize) -> Self {
        Self {
            tools: IndexMap::new(),
            max_output_tokens,
        }
    }

    /// Registers a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("Overwriting existing tool: {}", name);
        }
        debug!("Registered tool: {}", name);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.tools.shift_remove(name).is_some() {
            debug!("Unregistered tool: {}", name);
            return true;
        }
        false
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get_schemas(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn confirmation_for(
        &self,
        name: &str,
        params: &Map<String, Value>,
        cwd: &Path,
    ) -> Option<ToolConfirmation> {
        let tool = self.get(name)?;
        tool.get_confirmation(&ToolInvocation::new(params.clone(), cwd))
    }

    /// Runs a tool by name. Every failure mode comes back as a failed result.
    pub async fn invoke(&self, name: &str, params: Map<String, Value>, cwd: &Path) -> ToolResult {
        let Some(tool) = self.get(name).cloned() else {
            return ToolResult::error(format!("Unknown tool: {}", name))
                .with_metadata("tool_name", name)
                .with_metadata("error_kind", "unknown_tool");
        };

        let validation_errors = tool.validate_params(&params);
        if !validation_errors.is_empty() {
            return ToolResult::error(format!(
                "Invalid parameters: {}",
                validation_errors.join("; ")
            ))
            .with_metadata("tool_name", name)
            .with_metadata("validation_errors", validation_errors);
        }

        let invocation = ToolInvocation::new(params, cwd);
        let result = match AssertUnwindSafe(tool.execute(invocation))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Failed to execute tool {}: {:#}", name, e);
                ToolResult::error(format!("Failed to execute tool: {:#}", e))
                    .with_metadata("tool_name", name)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Tool {} panicked: {}", name, message);
                ToolResult::error(format!("Tool panicked: {}", message))
                    .with_metadata("tool_name", name)
            }
        };

        self.limit_output(result)
    }

    fn limit_output(&self, mut result: ToolResult) -> ToolResult {
        if !result.success || count_tokens(&result.output) <= self.max_output_tokens {
            return result;
        }

        result.output = truncate_text(
            &result.output,
            self.max_output_tokens,
            "\n... [output truncated]",
        );
        result.truncated = true;
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn create_default_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::with_output_budget(config.max_tool_output_tokens);
    registry.register(Arc::new(ReadFileTool::new()));
    registry.register(Arc::new(WriteFileTool::new()));
    registry.register(Arc::new(ShellTool::new()));
    registry
}
