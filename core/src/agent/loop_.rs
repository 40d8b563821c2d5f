use crate::agent::events::{AgentEvent, RunOutcome, StopReason};
use crate::agent::session::{LoopState, Session};
use crate::config::Config;
use crate::traits::{ChatRequest, StreamEvent, ToolCall, ToolConfirmation, ToolResult};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::path::Path;
use tracing::{debug, error, warn};

pub type ConfirmationHook = dyn Fn(&ToolConfirmation) -> bool + Send + Sync;

/// What one model request produced.
struct TurnOutput {
    text: String,
    tool_calls: Vec<ToolCall>,
    stream_failed: bool,
}

pub struct Agent {
    config: Config,
    session: Option<Session>,
    confirm: Option<Box<ConfirmationHook>>,
}

impl Agent {
    pub fn new(config: Config) -> Result<Self> {
        let session = Session::new(&config).context("Failed to create agent session")?;
        Ok(Self::with_session(config, session))
    }

    pub fn with_session(config: Config, session: Session) -> Self {
        Self {
            config,
            session: Some(session),
            confirm: None,
        }
    }

    /// Installs a hook asked before every mutating tool call. Returning
    /// `false` rejects the call.
    pub fn with_confirmation(
        mut self,
        confirm: impl Fn(&ToolConfirmation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.confirm = Some(Box::new(confirm));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Drops the session and with it the provider's HTTP client.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("Agent session closed");
        }
    }

    pub async fn run(
        &mut self,
        message: &str,
        mut on_event: impl FnMut(AgentEvent),
    ) -> Result<RunOutcome> {
        let Some(session) = self.session.as_mut() else {
            anyhow::bail!("Agent is closed; create a new agent to start another run");
        };

        on_event(AgentEvent::RunStarted {
            message: message.to_string(),
        });
        session.context.add_user_message(message);

        let outcome = agentic_loop(
            session,
            self.config.max_turns,
            &self.config.cwd,
            self.confirm.as_deref(),
            &mut on_event,
        )
        .await;

        on_event(AgentEvent::RunEnded {
            response: outcome.response.clone(),
            stop_reason: outcome.stop_reason,
        });

        Ok(outcome)
    }
}

async fn agentic_loop(
    session: &mut Session,
    max_turns: usize,
    cwd: &Path,
    confirm: Option<&ConfirmationHook>,
    on_event: &mut impl FnMut(AgentEvent),
) -> RunOutcome {
    let mut response = None;
    let mut turns = 0;

    let stop_reason = loop {
        if turns >= max_turns {
            break StopReason::MaxTurns;
        }
        turns += 1;

        let turn = session.context.increment_turn();
        debug!("Turn {} ({} of {} in this run)", turn, turns, max_turns);
        if session.context.exceeds_window() {
            warn!(
                "Conversation is about {} tokens, beyond the model's context window",
                session.context.estimated_tokens()
            );
        }

        session.set_state(LoopState::AwaitingModel);
        let TurnOutput {
            text,
            tool_calls,
            stream_failed,
        } = request_turn(session, on_event).await;

        let content = (!text.is_empty()).then_some(text);
        session.context.add_assistant_message(
            content.clone(),
            (!tool_calls.is_empty()).then_some(tool_calls.as_slice()),
        );

        if let Some(content) = content {
            on_event(AgentEvent::TextComplete {
                content: content.clone(),
            });
            response = Some(content);
        } else if tool_calls.is_empty() && stream_failed {
            break StopReason::StreamFailed;
        }

        if tool_calls.is_empty() {
            break StopReason::Completed;
        }

        session.set_state(LoopState::ProcessingToolCalls);
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let kind = session.registry.get(&call.name).map(|t| t.kind());
            on_event(AgentEvent::ToolCallStarted {
                call_id: call.id.clone(),
                name: call.name.clone(),
                kind,
                arguments: call.arguments.clone(),
            });

            let result = execute_call(session, cwd, confirm, &call).await;

            on_event(AgentEvent::ToolCallFinished {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: result.clone(),
            });
            results.push((call.id, result.to_model_output()));
        }

        for (call_id, content) in results {
            session.context.add_tool_result(call_id, content);
        }
    };

    session.set_state(LoopState::Done);
    debug!("Run stopped after {} turn(s): {:?}", turns, stop_reason);

    RunOutcome {
        response,
        stop_reason,
        turns,
    }
}

async fn request_turn(
    session: &Session,
    on_event: &mut impl FnMut(AgentEvent),
) -> TurnOutput {
    let mut output = TurnOutput {
        text: String::new(),
        tool_calls: Vec::new(),
        stream_failed: false,
    };

    let schemas = session.registry.get_schemas();
    let request = ChatRequest {
        messages: session.context.get_messages(),
        tools: (!schemas.is_empty()).then_some(schemas.as_slice()),
    };

    let mut stream = match session.provider().chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to start model stream: {:#}", e);
            output.stream_failed = true;
            on_event(AgentEvent::RunError {
                message: format!("{:#}", e),
            });
            return output;
        }
    };

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::TextDelta(content) => {
                if content.is_empty() {
                    continue;
                }
                output.text.push_str(&content);
                on_event(AgentEvent::TextDelta { content });
            }
            StreamEvent::ToolCallComplete(call) => output.tool_calls.push(call),
            StreamEvent::MessageComplete {
                finish_reason,
                usage,
            } => {
                debug!(
                    "Model message complete (finish_reason: {:?}, usage: {:?})",
                    finish_reason, usage
                );
            }
            StreamEvent::Error(message) => {
                error!("Model stream error: {}", message);
                output.stream_failed = true;
                let message = if message.is_empty() {
                    "Unknown error occurred".to_string()
                } else {
                    message
                };
                on_event(AgentEvent::RunError { message });
            }
        }
    }

    output
}

async fn execute_call(
    session: &Session,
    cwd: &Path,
    confirm: Option<&ConfirmationHook>,
    call: &ToolCall,
) -> ToolResult {
    // Calls the registry will refuse are never put in front of the user.
    let runnable = session
        .registry
        .get(&call.name)
        .is_some_and(|tool| tool.validate_params(&call.arguments).is_empty());

    if runnable
        && let Some(confirm) = confirm
        && let Some(confirmation) = session
            .registry
            .confirmation_for(&call.name, &call.arguments, cwd)
        && !confirm(&confirmation)
    {
        debug!("Tool call {} ({}) rejected", call.id, call.name);
        return ToolResult::error("Tool call rejected by user")
            .with_metadata("tool_name", call.name.as_str())
            .with_metadata("error_kind", "rejected");
    }

    session
        .registry
        .invoke(&call.name, call.arguments.clone(), cwd)
        .await
}
