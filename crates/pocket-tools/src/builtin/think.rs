// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Scratch-space tool: lets the model externalize a reasoning step without
/// any observable side effect. The thought is logged for debugging but never
/// surfaced to the end user — only a constant acknowledgement is returned.
#[derive(Default)]
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str { "think" }

    fn description(&self) -> &str {
        "Record a reasoning step without taking any action or producing user-visible output.\n\
         Use this to plan before calling other tools, especially before a sequence of\n\
         side-effecting calls (exec, write_file, message) where getting the order right matters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "The reasoning step to record"
                }
            },
            "required": ["thought"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let thought = match call.args.get("thought").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, "missing required parameter 'thought'"),
        };
        debug!(thought = %thought, "think tool");
        ToolOutput::ok(&call.id, "Acknowledged.")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "t1".into(), name: "think".into(), args }
    }

    #[tokio::test]
    async fn acknowledges_without_echoing_thought() {
        let t = ThinkTool;
        let out = t.execute(&call(json!({"thought": "secret plan"}))).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "Acknowledged.");
        assert!(!out.content.contains("secret plan"));
    }

    #[tokio::test]
    async fn missing_thought_is_error() {
        let t = ThinkTool;
        let out = t.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("thought"));
    }
}
