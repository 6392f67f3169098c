// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use pocket_bus::{Bus, OutboundMessage};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Publishes an ad-hoc `OutboundMessage` mid-turn, independent of the one
/// outbound message the agent loop publishes automatically at the end of a
/// turn. Useful for progress updates on long-running tool sequences.
pub struct MessageTool {
    pub bus: Arc<Bus>,
    pub context: Arc<RwLock<Arc<ToolContext>>>,
}

impl MessageTool {
    pub fn new(bus: Arc<Bus>, context: Arc<RwLock<Arc<ToolContext>>>) -> Self {
        Self { bus, context }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str { "message" }

    fn description(&self) -> &str {
        "Send a message to the user on the current (or an explicitly given) channel/chat,\n\
         without waiting for the turn to finish. channel and chat_id default to the channel\n\
         and chat the current inbound turn arrived on; fails if neither an explicit value\n\
         nor an ambient default is available."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Text to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Target channel (defaults to the current turn's channel)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat id (defaults to the current turn's chat id)"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'content'"),
        };

        let ctx = self.context.read().expect("tool context lock poisoned").clone();
        let channel = call.args.get("channel").and_then(|v| v.as_str()).map(str::to_string)
            .or_else(|| ctx.default_channel.clone());
        let chat_id = call.args.get("chat_id").and_then(|v| v.as_str()).map(str::to_string)
            .or_else(|| ctx.default_chat_id.clone());

        let (Some(channel), Some(chat_id)) = (channel, chat_id) else {
            return ToolOutput::err(
                &call.id,
                "no channel/chat_id given and none available from ambient context",
            );
        };

        debug!(channel = %channel, chat_id = %chat_id, "message tool");

        let outbound = OutboundMessage {
            channel,
            chat_id,
            content,
            media: vec![],
            reply_to: None,
            metadata: Default::default(),
        };

        match self.bus.publish_outbound(outbound).await {
            Ok(()) => ToolOutput::ok(&call.id, "message sent"),
            Err(e) => ToolOutput::err(&call.id, format!("publish error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "m1".into(), name: "message".into(), args }
    }

    fn tool_with_context(ctx: ToolContext) -> (MessageTool, Arc<Bus>) {
        let bus = Arc::new(Bus::new());
        let context = Arc::new(RwLock::new(Arc::new(ctx)));
        (MessageTool::new(bus.clone(), context), bus)
    }

    #[tokio::test]
    async fn publishes_with_explicit_channel_and_chat_id() {
        let (tool, bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({
            "content": "hi", "channel": "cli", "chat_id": "room1"
        }))).await;
        assert!(!out.is_error, "{}", out.content);
        let m = bus.consume_outbound().await.unwrap();
        assert_eq!(m.channel, "cli");
        assert_eq!(m.chat_id, "room1");
        assert_eq!(m.content, "hi");
    }

    #[tokio::test]
    async fn falls_back_to_ambient_defaults() {
        let ctx = ToolContext {
            default_channel: Some("cli".into()),
            default_chat_id: Some("room1".into()),
            ..ToolContext::default()
        };
        let (tool, bus) = tool_with_context(ctx);
        let out = tool.execute(&call(json!({ "content": "hi" }))).await;
        assert!(!out.is_error, "{}", out.content);
        let m = bus.consume_outbound().await.unwrap();
        assert_eq!(m.channel, "cli");
    }

    #[tokio::test]
    async fn fails_without_channel_or_ambient_default() {
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({ "content": "hi" }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("ambient context"));
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({ "channel": "cli", "chat_id": "r" }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("content"));
    }
}
