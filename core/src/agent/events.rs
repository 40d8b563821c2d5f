use crate::traits::{ToolKind, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A turn produced no tool calls.
    Completed,
    /// The turn budget ran out while the model still wanted tools.
    MaxTurns,
    /// A stream fault left the final turn with neither text nor tool calls.
    StreamFailed,
}

/// Progress reported to whoever drives the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    RunStarted {
        message: String,
    },
    TextDelta {
        content: String,
    },
    TextComplete {
        content: String,
    },
    ToolCallStarted {
        call_id: String,
        name: String,
        kind: Option<ToolKind>,
        arguments: Map<String, Value>,
    },
    ToolCallFinished {
        call_id: String,
        name: String,
        result: ToolResult,
    },
    RunError {
        message: String,
    },
    RunEnded {
        response: Option<String>,
        stop_reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub response: Option<String>,
    pub stop_reason: StopReason,
    pub turns: usize,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_snake_case() {
        let event = AgentEvent::RunEnded {
            response: Some("done".into()),
            stop_reason: StopReason::MaxTurns,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "run_ended", "response": "done", "stop_reason": "max_turns"})
        );

        let started = AgentEvent::ToolCallStarted {
            call_id: "c1".into(),
            name: "shell".into(),
            kind: Some(ToolKind::Shell),
            arguments: Map::new(),
        };
        let value = serde_json::to_value(&started).unwrap();
        assert_eq!(value["type"], "tool_call_started");
        assert_eq!(value["kind"], "shell");
    }

    #[test]
    fn only_completed_runs_are_complete() {
        let outcome = |stop_reason| RunOutcome {
            response: None,
            stop_reason,
            turns: 1,
        };
        assert!(outcome(StopReason::Completed).is_complete());
        assert!(!outcome(StopReason::MaxTurns).is_complete());
        assert!(!outcome(StopReason::StreamFailed).is_complete());
    }
}
