// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use tracing::debug;

use pocket_scheduler::{JobPayload, Schedule, Scheduler};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Add/remove/enable/disable/list scheduled jobs (see `pocket-scheduler`).
pub struct CronTool {
    pub scheduler: Arc<Scheduler>,
}

impl CronTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    fn arg_str<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
        call.args.get(key).and_then(|v| v.as_str())
    }

    fn parse_schedule(call: &ToolCall) -> Result<Schedule, String> {
        match Self::arg_str(call, "kind") {
            Some("at") => {
                let Some(at) = Self::arg_str(call, "at") else {
                    return Err("kind=at requires 'at' (RFC3339 timestamp)".into());
                };
                let at = DateTime::parse_from_rfc3339(at)
                    .map_err(|e| format!("invalid 'at' timestamp: {e}"))?
                    .with_timezone(&chrono::Utc);
                Ok(Schedule::At { at })
            }
            Some("every") => {
                let Some(every_ms) = call.args.get("every_ms").and_then(|v| v.as_u64()) else {
                    return Err("kind=every requires 'every_ms'".into());
                };
                Ok(Schedule::Every { every_ms })
            }
            Some("cron") => {
                let Some(expression) = Self::arg_str(call, "expression") else {
                    return Err("kind=cron requires 'expression'".into());
                };
                Ok(Schedule::Cron { expression: expression.to_string() })
            }
            Some(other) => Err(format!("unknown schedule kind '{other}'; expected at/every/cron")),
            None => Err("missing required parameter 'kind'".into()),
        }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str { "cron" }

    fn description(&self) -> &str {
        "Manage scheduled jobs that fire a message into this assistant (or out to a channel\n\
         directly) on a timer.\n\
         action=\"add\" — create a job. Requires name, kind (one of at/every/cron), content,\n\
         and the field matching kind: at=\"<RFC3339 timestamp>\", every_ms=<integer ms, >= 60000>,\n\
         or expression=\"<5-field cron>\". Optional: deliver (bool, default false — when true,\n\
         sends content directly to channel/chat_id instead of re-entering the assistant),\n\
         channel, chat_id, enabled (default true), delete_after_run.\n\
         action=\"remove\" — delete a job (requires job_id).\n\
         action=\"enable\" / action=\"disable\" — toggle a job (requires job_id).\n\
         action=\"list\" — show all jobs (optional include_disabled, default false)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "remove", "enable", "disable", "list"]
                },
                "job_id": { "type": "string" },
                "name": { "type": "string" },
                "kind": { "type": "string", "enum": ["at", "every", "cron"] },
                "at": { "type": "string", "description": "RFC3339 timestamp, for kind=at" },
                "every_ms": { "type": "integer", "description": "milliseconds, for kind=every, min 60000" },
                "expression": { "type": "string", "description": "5-field cron expression, for kind=cron" },
                "content": { "type": "string" },
                "deliver": { "type": "boolean" },
                "channel": { "type": "string" },
                "chat_id": { "type": "string" },
                "enabled": { "type": "boolean" },
                "delete_after_run": { "type": "boolean" },
                "include_disabled": { "type": "boolean" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match Self::arg_str(call, "action") {
            Some(a) => a.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'action'"),
        };

        debug!(action = %action, "cron tool");

        match action.as_str() {
            "add" => {
                let schedule = match Self::parse_schedule(call) {
                    Ok(s) => s,
                    Err(e) => return ToolOutput::err(&call.id, e),
                };
                let Some(name) = Self::arg_str(call, "name") else {
                    return ToolOutput::err(&call.id, "action=add requires 'name'");
                };
                let Some(content) = Self::arg_str(call, "content") else {
                    return ToolOutput::err(&call.id, "action=add requires 'content'");
                };
                let payload = JobPayload {
                    content: content.to_string(),
                    deliver: call.args.get("deliver").and_then(|v| v.as_bool()).unwrap_or(false),
                    channel: Self::arg_str(call, "channel").map(str::to_string),
                    chat_id: Self::arg_str(call, "chat_id").map(str::to_string),
                };
                let enabled = call.args.get("enabled").and_then(|v| v.as_bool());
                let delete_after_run = call.args.get("delete_after_run").and_then(|v| v.as_bool());

                match self.scheduler.add_job(schedule, payload, name, enabled, delete_after_run).await {
                    Ok(job) => ToolOutput::ok(&call.id, format!("created job {} ({})", job.id, job.name)),
                    Err(e) => ToolOutput::err(&call.id, format!("cron error: {e}")),
                }
            }
            "remove" => {
                let Some(job_id) = Self::arg_str(call, "job_id") else {
                    return ToolOutput::err(&call.id, "action=remove requires 'job_id'");
                };
                match self.scheduler.remove_job(job_id).await {
                    Ok(()) => ToolOutput::ok(&call.id, format!("removed job {job_id}")),
                    Err(e) => ToolOutput::err(&call.id, format!("cron error: {e}")),
                }
            }
            "enable" | "disable" => {
                let Some(job_id) = Self::arg_str(call, "job_id") else {
                    return ToolOutput::err(&call.id, format!("action={action} requires 'job_id'"));
                };
                match self.scheduler.enable_job(job_id, action == "enable").await {
                    Ok(()) => ToolOutput::ok(&call.id, format!("{action}d job {job_id}")),
                    Err(e) => ToolOutput::err(&call.id, format!("cron error: {e}")),
                }
            }
            "list" => {
                let include_disabled =
                    call.args.get("include_disabled").and_then(|v| v.as_bool()).unwrap_or(false);
                let jobs = self.scheduler.list_jobs(include_disabled).await;
                if jobs.is_empty() {
                    return ToolOutput::ok(&call.id, "(no jobs)");
                }
                let lines: Vec<String> = jobs
                    .iter()
                    .map(|j| {
                        format!(
                            "{}\t{}\tenabled={}\tnext_run_at={}",
                            j.id,
                            j.name,
                            j.enabled,
                            j.next_run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
                        )
                    })
                    .collect();
                ToolOutput::ok(&call.id, lines.join("\n"))
            }
            other => ToolOutput::err(&call.id, format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};
    use pocket_bus::Bus;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: "cron".into(), args }
    }

    async fn tool() -> CronTool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        let scheduler = Scheduler::new(path, Arc::new(Bus::new()), 1000).await.unwrap();
        CronTool::new(Arc::new(scheduler))
    }

    #[tokio::test]
    async fn add_every_job_then_list() {
        let t = tool().await;
        let out = t.execute(&call(json!({
            "action": "add", "name": "heartbeat", "kind": "every", "every_ms": 60000, "content": "ping"
        }))).await;
        assert!(!out.is_error, "{}", out.content);

        let out = t.execute(&call(json!({ "action": "list" }))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("heartbeat"));
    }

    #[tokio::test]
    async fn add_missing_kind_is_error() {
        let t = tool().await;
        let out = t.execute(&call(json!({
            "action": "add", "name": "x", "content": "y"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("kind"));
    }

    #[tokio::test]
    async fn remove_missing_job_is_error() {
        let t = tool().await;
        let out = t.execute(&call(json!({ "action": "remove", "job_id": "nope" }))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn enable_disable_round_trip() {
        let t = tool().await;
        let add = t.execute(&call(json!({
            "action": "add", "name": "heartbeat", "kind": "every", "every_ms": 60000, "content": "ping"
        }))).await;
        let job_id = add.content.split_whitespace().nth(2).unwrap().to_string();

        let out = t.execute(&call(json!({ "action": "disable", "job_id": job_id }))).await;
        assert!(!out.is_error, "{}", out.content);

        let list = t.execute(&call(json!({ "action": "list" }))).await;
        assert_eq!(list.content, "(no jobs)");
    }

    #[tokio::test]
    async fn unknown_action_is_error() {
        let t = tool().await;
        let out = t.execute(&call(json!({ "action": "frobnicate" }))).await;
        assert!(out.is_error);
    }
}
