use crate::traits::{ChatMessage, ChatRequest, Provider, StreamEvent, ToolCall};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub enum Script {
    Events(Vec<StreamEvent>),
    SetupError(String),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Option<Vec<String>>,
}

pub type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// Replays one scripted response per turn and records what it was asked.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Script>>,
    repeat_last: bool,
    log: RequestLog,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self::from_scripts(turns.into_iter().map(Script::Events).collect())
    }

    pub fn from_scripts(scripts: Vec<Script>) -> Self {
        Self {
            turns: Mutex::new(scripts.into()),
            repeat_last: false,
            log: Arc::default(),
        }
    }

    /// Answers every request with the same events.
    pub fn repeating(events: Vec<StreamEvent>) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![events])
        }
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
    ) -> anyhow::Result<BoxStream<'static, StreamEvent>> {
        self.log.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tool_names: request
                .tools
                .map(|tools| tools.iter().map(|t| t.name.clone()).collect()),
        });

        let script = {
            let mut turns = self.turns.lock().unwrap();
            match turns.pop_front() {
                Some(Script::Events(events)) if self.repeat_last => {
                    turns.push_back(Script::Events(events.clone()));
                    Script::Events(events)
                }
                Some(script) => script,
                None => Script::Events(vec![finished("stop")]),
            }
        };

        match script {
            Script::Events(events) => Ok(futures_util::stream::iter(events).boxed()),
            Script::SetupError(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

pub fn text(content: &str) -> StreamEvent {
    StreamEvent::TextDelta(content.to_string())
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> StreamEvent {
    StreamEvent::ToolCallComplete(ToolCall::new(
        id,
        name,
        arguments.as_object().cloned().unwrap_or_default(),
    ))
}

pub fn finished(reason: &str) -> StreamEvent {
    StreamEvent::MessageComplete {
        finish_reason: Some(reason.to_string()),
        usage: None,
    }
}
