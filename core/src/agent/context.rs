use crate::config::Config;
use crate::traits::{ChatMessage, FunctionCall, ToolCall};
use crate::utils::count_tokens;
use std::path::Path;

const IDENTITY: &str = "You are ember, a coding agent working in the user's project directory. \
Use the available tools to inspect and change files, then answer concisely.";

/// Append-only message log for one session.
pub struct ContextManager {
    messages: Vec<ChatMessage>,
    turn_count: usize,
    context_window: Option<usize>,
}

impl ContextManager {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            messages: system_prompt.map(ChatMessage::system).into_iter().collect(),
            turn_count: 0,
            context_window: None,
        }
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    pub fn add_assistant_message(&mut self, content: Option<String>, tool_calls: Option<&[ToolCall]>) {
        let tool_calls = tool_calls.map(|calls| calls.iter().map(FunctionCall::from).collect());
        self.messages.push(ChatMessage::assistant(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::tool_result(tool_call_id, content));
    }

    pub fn get_messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn increment_turn(&mut self) -> usize {
        self.turn_count += 1;
        self.turn_count
    }

    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| {
                let calls: usize = m
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|c| count_tokens(&c.name) + count_tokens(&c.arguments))
                    .sum();
                count_tokens(m.content_or_empty()) + calls
            })
            .sum()
    }

    pub fn exceeds_window(&self) -> bool {
        self.context_window
            .is_some_and(|window| self.estimated_tokens() > window)
    }
}

pub fn build_system_prompt(config: &Config) -> String {
    let mut parts = vec![IDENTITY.to_string()];

    if let Some(instructions) = config.developer_instructions.as_deref().map(str::trim)
        && !instructions.is_empty()
    {
        parts.push(format!("## Developer Instructions\n\n{}", instructions));
    }

    if let Some(instructions) = config.user_instructions.as_deref().map(str::trim)
        && !instructions.is_empty()
    {
        parts.push(format!("## User Instructions\n\n{}", instructions));
    }

    parts.push(runtime_context(&config.cwd));

    parts.join("\n\n---\n\n")
}

fn runtime_context(cwd: &Path) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");

    format!(
        "## Runtime Context

### Current Time
{}

### Working Directory
{}",
        timestamp,
        cwd.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Role;
    use serde_json::{Map, json};

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "shell", json!({"command": "ls"}).as_object().cloned().unwrap())
    }

    #[test]
    fn system_prompt_is_first() {
        let mut context = ContextManager::new(Some("sys".into()));
        context.add_user_message("hi");
        let messages = context.get_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);

        let bare = ContextManager::new(None);
        assert!(bare.is_empty());
    }

    #[test]
    fn tool_only_assistant_turn_appends_one_message() {
        let mut context = ContextManager::new(None);
        let calls = vec![call("a"), call("b")];
        context.add_assistant_message(None, Some(&calls));
        context.add_tool_result("a", "out a");
        context.add_tool_result("b", "out b");

        let messages = context.get_messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].content.is_none());
        let ids: Vec<_> = messages[0]
            .tool_calls
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("a"));
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("b"));
    }

    #[test]
    fn empty_turn_still_recorded() {
        let mut context = ContextManager::new(None);
        context.add_assistant_message(None, None);
        assert_eq!(context.len(), 1);
        assert_eq!(context.get_messages()[0].role, Role::Assistant);
    }

    #[test]
    fn turn_counter_and_window() {
        let mut context = ContextManager::new(None).with_context_window(2);
        assert_eq!(context.increment_turn(), 1);
        assert_eq!(context.increment_turn(), 2);
        assert_eq!(context.turn_count(), 2);

        assert!(!context.exceeds_window());
        context.add_user_message("x".repeat(40));
        assert_eq!(context.estimated_tokens(), 10);
        assert!(context.exceeds_window());

        context.add_assistant_message(
            None,
            Some(&[ToolCall::new("c", "noop", Map::new())]),
        );
        assert!(context.estimated_tokens() > 10);
    }

    #[test]
    fn system_prompt_includes_instructions_and_cwd() {
        let config = Config {
            developer_instructions: Some("Prefer small diffs.".into()),
            user_instructions: Some("   ".into()),
            cwd: "/srv/project".into(),
            ..Config::default()
        };
        let prompt = build_system_prompt(&config);
        assert!(prompt.starts_with("You are ember"));
        assert!(prompt.contains("Prefer small diffs."));
        assert!(!prompt.contains("User Instructions"));
        assert!(prompt.contains("/srv/project"));
    }
}
