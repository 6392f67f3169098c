// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use pocket_memory::MemoryStore;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Delegates to the external memory collaborator: `remember_*`, `search`,
/// `relevant_context`, `recent_events`, `stats`. The agent core never assumes
/// a specific backing store — this tool only knows the [`MemoryStore`] trait.
pub struct MemoryTool {
    pub store: Arc<dyn MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    fn arg_str<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
        call.args.get(key).and_then(|v| v.as_str())
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str { "memory" }

    fn description(&self) -> &str {
        "Record or retrieve durable facts about the user and this workspace.\n\
         action=\"remember_learned\" — a fact the assistant inferred on its own (requires key, value).\n\
         action=\"remember_user\" — a fact the user stated about themself (requires key, value).\n\
         action=\"remember_preference\" — a stated preference (requires key, value).\n\
         action=\"remember_context\" — ambient situational context (requires key, value).\n\
         action=\"search\" — facts matching a query (requires query).\n\
         action=\"relevant_context\" — a prose blurb of facts relevant to a query, for splicing\n\
         into a prompt (requires query; optional max_facts, default 5).\n\
         action=\"recent_events\" — the n most recently recorded facts (optional n, default 10).\n\
         action=\"stats\" — record counts by kind."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "remember_learned", "remember_user", "remember_preference",
                        "remember_context", "search", "relevant_context", "recent_events", "stats"
                    ]
                },
                "key": { "type": "string" },
                "value": { "type": "string" },
                "query": { "type": "string" },
                "max_facts": { "type": "integer" },
                "n": { "type": "integer" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match Self::arg_str(call, "action") {
            Some(a) => a.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'action'"),
        };

        debug!(action = %action, "memory tool");

        match action.as_str() {
            "remember_learned" | "remember_user" | "remember_preference" | "remember_context" => {
                let Some(key) = Self::arg_str(call, "key") else {
                    return ToolOutput::err(&call.id, format!("action={action} requires 'key'"));
                };
                let Some(value) = Self::arg_str(call, "value") else {
                    return ToolOutput::err(&call.id, format!("action={action} requires 'value'"));
                };
                let result = match action.as_str() {
                    "remember_learned" => self.store.remember_learned(key, value).await,
                    "remember_user" => self.store.remember_user(key, value).await,
                    "remember_preference" => self.store.remember_preference(key, value).await,
                    _ => self.store.remember_context(key, value).await,
                };
                match result {
                    Ok(()) => ToolOutput::ok(&call.id, format!("remembered {key}")),
                    Err(e) => ToolOutput::err(&call.id, format!("memory error: {e}")),
                }
            }
            "search" => {
                let Some(query) = Self::arg_str(call, "query") else {
                    return ToolOutput::err(&call.id, "action=search requires 'query'");
                };
                match self.store.search(query).await {
                    Ok(hits) if hits.is_empty() => ToolOutput::ok(&call.id, "(no matches)"),
                    Ok(hits) => {
                        let lines: Vec<String> = hits
                            .iter()
                            .map(|r| format!("[{}] {}: {}", r.kind.as_str(), r.key, r.value))
                            .collect();
                        ToolOutput::ok(&call.id, lines.join("\n"))
                    }
                    Err(e) => ToolOutput::err(&call.id, format!("memory error: {e}")),
                }
            }
            "relevant_context" => {
                let Some(query) = Self::arg_str(call, "query") else {
                    return ToolOutput::err(&call.id, "action=relevant_context requires 'query'");
                };
                let max_facts = call.args.get("max_facts").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
                match self.store.relevant_context(query, max_facts).await {
                    Ok(text) if text.is_empty() => ToolOutput::ok(&call.id, "(no relevant context)"),
                    Ok(text) => ToolOutput::ok(&call.id, text),
                    Err(e) => ToolOutput::err(&call.id, format!("memory error: {e}")),
                }
            }
            "recent_events" => {
                let n = call.args.get("n").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
                match self.store.recent_events(n).await {
                    Ok(events) if events.is_empty() => ToolOutput::ok(&call.id, "(no events)"),
                    Ok(events) => {
                        let lines: Vec<String> = events
                            .iter()
                            .map(|r| format!("[{}] {}: {}", r.kind.as_str(), r.key, r.value))
                            .collect();
                        ToolOutput::ok(&call.id, lines.join("\n"))
                    }
                    Err(e) => ToolOutput::err(&call.id, format!("memory error: {e}")),
                }
            }
            "stats" => match self.store.stats().await {
                Ok(stats) => {
                    let mut keys: Vec<_> = stats.keys().collect();
                    keys.sort();
                    let lines: Vec<String> = keys.iter().map(|k| format!("{k}={}", stats[*k])).collect();
                    ToolOutput::ok(&call.id, lines.join("\n"))
                }
                Err(e) => ToolOutput::err(&call.id, format!("memory error: {e}")),
            },
            other => ToolOutput::err(&call.id, format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};
    use pocket_memory::InMemoryMemoryStore;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "mem1".into(), name: "memory".into(), args }
    }

    fn tool() -> MemoryTool {
        MemoryTool::new(Arc::new(InMemoryMemoryStore::new()))
    }

    #[tokio::test]
    async fn remember_user_then_search_round_trips() {
        let t = tool();
        let out = t.execute(&call(json!({
            "action": "remember_user", "key": "name", "value": "Martin"
        }))).await;
        assert!(!out.is_error, "{}", out.content);

        let out = t.execute(&call(json!({ "action": "search", "query": "Martin" }))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("name"));
    }

    #[tokio::test]
    async fn relevant_context_returns_prose() {
        let t = tool();
        t.execute(&call(json!({
            "action": "remember_preference", "key": "editor", "value": "vim"
        }))).await;
        let out = t.execute(&call(json!({ "action": "relevant_context", "query": "editor" }))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("vim"));
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let t = tool();
        t.execute(&call(json!({
            "action": "remember_learned", "key": "a", "value": "1"
        }))).await;
        let out = t.execute(&call(json!({ "action": "stats" }))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("total=1"));
    }

    #[tokio::test]
    async fn missing_key_is_error() {
        let t = tool();
        let out = t.execute(&call(json!({ "action": "remember_user", "value": "x" }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("key"));
    }

    #[tokio::test]
    async fn unknown_action_is_error() {
        let t = tool();
        let out = t.execute(&call(json!({ "action": "frobnicate" }))).await;
        assert!(out.is_error);
    }
}
