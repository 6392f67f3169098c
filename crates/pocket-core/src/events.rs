// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use pocket_bus::StateChange;
use pocket_tools::ToolCall;

/// Events emitted by the agent during a single turn.
///
/// These are a finer-grained companion to the bus's own queues: the bus
/// carries `InboundMessage`/`OutboundMessage`/`ToolExecutionEvent`/`StateChange`
/// across process boundaries, while `AgentEvent` is the in-process stream a
/// caller of [`crate::Agent::run`] can subscribe to for live UI.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model.
    TextDelta(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    ThinkingDelta(String),
    /// The model has requested a tool call.
    ToolCallStarted(ToolCall),
    /// A tool call finished.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Current token usage update for one model round trip.
    TokenUsage {
        input: u32,
        output: u32,
        cache_read: u32,
        cache_write: u32,
        /// `input + output`.
        total: u32,
    },
    /// The per-session state machine transitioned (mirrors the event
    /// published on the bus).
    StateChanged(StateChange),
    /// The agent has finished processing the current user turn.
    TurnComplete,
    /// The turn ended in the `Failed` state.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocket_bus::AgentState;

    #[test]
    fn state_changed_carries_the_bus_event() {
        let sc = StateChange::new("cli:1", AgentState::Idle, AgentState::Building);
        let ev = AgentEvent::StateChanged(sc.clone());
        match ev {
            AgentEvent::StateChanged(inner) => {
                assert_eq!(inner.session_key, "cli:1");
                assert_eq!(inner.from, AgentState::Idle);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn tool_call_finished_carries_error_flag() {
        let ev = AgentEvent::ToolCallFinished {
            call_id: "1".into(),
            tool_name: "exec".into(),
            output: "boom".into(),
            is_error: true,
        };
        match ev {
            AgentEvent::ToolCallFinished { is_error, .. } => assert!(is_error),
            _ => panic!("wrong variant"),
        }
    }
}
