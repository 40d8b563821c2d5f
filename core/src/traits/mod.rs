pub mod provider;
pub mod tool;

pub use provider::{
    ChatMessage, ChatRequest, FunctionCall, Provider, Role, StreamEvent, TokenUsage, ToolCall,
};
pub use tool::{
    ParamSpec, ParamType, Tool, ToolConfirmation, ToolInvocation, ToolKind, ToolResult,
    ToolSchema, ToolSpec,
};
