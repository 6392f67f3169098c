// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Kind of attached media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

/// A single piece of media referenced by a message.
///
/// At least one of `path`/`data` must be set — a `Media` with neither is
/// unusable and callers should treat it as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub path: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    /// Inline bytes, base64-encoded when serialized to JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl Media {
    pub fn is_usable(&self) -> bool {
        self.path.is_some() || self.data.is_some()
    }
}

/// A message arriving from a channel adapter or the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InboundMessage {
    /// `session_key = channel + ":" + chat_id` — the agent loop's unit of serialization.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// `true` when `channel`, `sender_id`, and `chat_id` are all non-empty.
    pub fn is_valid(&self) -> bool {
        !self.channel.is_empty() && !self.sender_id.is_empty() && !self.chat_id.is_empty()
    }
}

/// A message to be rendered and sent by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OutboundMessage {
    pub fn is_valid(&self) -> bool {
        !self.channel.is_empty() && !self.chat_id.is_empty()
    }
}

/// Per-session agent state, mirrored by `pocket-core`'s FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Building,
    AwaitingModel,
    ExecutingTools,
    Publishing,
    Failed,
}

/// Emitted on every agent state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub session_key: String,
    pub from: AgentState,
    pub to: AgentState,
    pub reason: Option<String>,
}

impl StateChange {
    pub fn new(session_key: impl Into<String>, from: AgentState, to: AgentState) -> Self {
        Self { session_key: session_key.into(), from, to, reason: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// `from != to` is mandatory (§3 invariant).
    pub fn is_valid(&self) -> bool {
        self.from != self.to
    }
}

/// Bus-level projection of a tool invocation, decoupled from `pocket-tools`'s
/// own `ToolExecution` type so this crate carries no dependency on the tools
/// crate. `pocket-core` maps one to the other when publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionEvent {
    pub session_key: String,
    pub tool_call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub is_error: bool,
    pub result: String,
    pub duration_ms: u64,
}
