// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use pocket_model::{ContentPart, FunctionCall, Message, MessageContent, Role, ToolContentPart, ToolResultContent};

/// A tool call as it appears in the on-disk wire format: a flat
/// `{id, name, arguments}` triple rather than the nested
/// [`pocket_model::MessageContent::ToolCall`] shape used internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A single content block within a [`RecordContent::Blocks`] value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { image_url: String },
}

/// Message content on disk: either a plain string or an array of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl RecordContent {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Blocks(_) => None,
        }
    }
}

/// One line of a session's `.jsonl` file.
///
/// Unknown fields in a loaded line are tolerated (ignored) by serde's default
/// deserialization behavior; because a record is always rebuilt from a
/// canonical [`Message`] before being re-serialized, nothing unrecognized
/// ever survives a rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub role: String,
    pub content: RecordContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl From<&Message> for SessionRecord {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
        .to_string();

        match &msg.content {
            MessageContent::Text(t) => SessionRecord {
                role,
                content: RecordContent::Text(t.clone()),
                name: None,
                tool_call_id: None,
                tool_calls: vec![],
            },
            MessageContent::ContentParts(parts) => SessionRecord {
                role,
                content: RecordContent::Blocks(parts.iter().map(content_part_to_block).collect()),
                name: None,
                tool_call_id: None,
                tool_calls: vec![],
            },
            MessageContent::ToolCall { tool_call_id, function } => SessionRecord {
                role,
                content: RecordContent::Text(String::new()),
                name: None,
                tool_call_id: None,
                tool_calls: vec![ToolCallRecord {
                    id: tool_call_id.clone(),
                    name: function.name.clone(),
                    arguments: function.arguments.clone(),
                }],
            },
            MessageContent::ToolResult { tool_call_id, content } => SessionRecord {
                role,
                content: tool_result_to_record_content(content),
                name: None,
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: vec![],
            },
        }
    }
}

impl SessionRecord {
    /// Reconstruct the [`Message`] this record represents.
    ///
    /// An unrecognized `role` string falls back to `assistant` with the raw
    /// text preserved, rather than failing the whole load.
    pub fn to_message(&self) -> Message {
        if let Some(tool_call_id) = &self.tool_call_id {
            let content = record_content_to_tool_result(&self.content);
            return Message {
                role: Role::Tool,
                content: MessageContent::ToolResult { tool_call_id: tool_call_id.clone(), content },
            };
        }

        if let Some(call) = self.tool_calls.first() {
            return Message {
                role: Role::Assistant,
                content: MessageContent::ToolCall {
                    tool_call_id: call.id.clone(),
                    function: FunctionCall { name: call.name.clone(), arguments: call.arguments.clone() },
                },
            };
        }

        let role = match self.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "tool" => Role::Tool,
            _ => Role::Assistant,
        };

        let content = match &self.content {
            RecordContent::Text(t) => MessageContent::Text(t.clone()),
            RecordContent::Blocks(blocks) => {
                MessageContent::ContentParts(blocks.iter().map(block_to_content_part).collect())
            }
        };

        Message { role, content }
    }
}

fn content_part_to_block(part: &ContentPart) -> ContentBlock {
    match part {
        ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
        ContentPart::Image { image_url, .. } => ContentBlock::Image { image_url: image_url.clone() },
    }
}

fn block_to_content_part(block: &ContentBlock) -> ContentPart {
    match block {
        ContentBlock::Text { text } => ContentPart::text(text.clone()),
        ContentBlock::Image { image_url } => ContentPart::image(image_url.clone()),
    }
}

fn tool_result_to_record_content(content: &ToolResultContent) -> RecordContent {
    match content {
        ToolResultContent::Text(t) => RecordContent::Text(t.clone()),
        ToolResultContent::Parts(parts) => RecordContent::Blocks(
            parts
                .iter()
                .map(|p| match p {
                    ToolContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
                    ToolContentPart::Image { image_url } => ContentBlock::Image { image_url: image_url.clone() },
                })
                .collect(),
        ),
    }
}

fn record_content_to_tool_result(content: &RecordContent) -> ToolResultContent {
    match content {
        RecordContent::Text(t) => ToolResultContent::Text(t.clone()),
        RecordContent::Blocks(blocks) => ToolResultContent::Parts(
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => ToolContentPart::Text { text: text.clone() },
                    ContentBlock::Image { image_url } => ToolContentPart::Image { image_url: image_url.clone() },
                })
                .collect(),
        ),
    }
}

/// Mutate a record in place so any oversized tool argument / result string is
/// replaced by its truncated form. Used only on the path to persistence;
/// never applied to the in-turn copy of a tool result.
pub(crate) fn apply_truncation(record: &mut SessionRecord, category: pocket_tools::OutputCategory) {
    for call in &mut record.tool_calls {
        call.arguments = crate::truncate::truncate_argument(&call.arguments);
    }
    if record.tool_call_id.is_some() {
        if let Some(text) = record.content.as_text() {
            record.content = RecordContent::Text(crate::truncate::truncate_result(text, category));
        }
    }
}
