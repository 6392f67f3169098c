// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::jobs::JobStore;
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// List/status/output/kill for background jobs started by the `exec` tool.
pub struct JobsTool {
    pub workspace_root: Option<PathBuf>,
}

impl Default for JobsTool {
    fn default() -> Self {
        Self { workspace_root: None }
    }
}

impl JobsTool {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }

    fn store(&self) -> JobStore {
        let root = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join(".pocketrb")
            .join("jobs");
        JobStore::new(root)
    }
}

#[async_trait]
impl Tool for JobsTool {
    fn name(&self) -> &str { "jobs" }

    fn description(&self) -> &str {
        "Manage background jobs started by exec with background=true (or auto-detached\n\
         because the command looked long-running).\n\
         action=\"list\" — show all known jobs and their status.\n\
         action=\"status\" — show one job's pid/command/status (requires job_id).\n\
         action=\"output\" — show a job's captured stdout/stderr (requires job_id; optional\n\
         'lines' returns only the last N lines).\n\
         action=\"kill\" — send SIGTERM to a running job (requires job_id)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "status", "output", "kill"]
                },
                "job_id": {
                    "type": "string",
                    "description": "Job id, required for status/output/kill"
                },
                "lines": {
                    "type": "integer",
                    "description": "For action=output, return only the last N lines"
                }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }

    fn output_category(&self) -> OutputCategory { OutputCategory::HeadTail }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match call.args.get("action").and_then(|v| v.as_str()) {
            Some(a) => a.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'action'"),
        };
        let job_id = call.args.get("job_id").and_then(|v| v.as_str()).map(str::to_string);
        let lines = call.args.get("lines").and_then(|v| v.as_u64()).map(|v| v as usize);

        debug!(action = %action, job_id = ?job_id, "jobs tool");

        let store = self.store();

        match action.as_str() {
            "list" => match store.list().await {
                Ok(jobs) if jobs.is_empty() => ToolOutput::ok(&call.id, "(no jobs)"),
                Ok(jobs) => {
                    let lines: Vec<String> = jobs
                        .iter()
                        .map(|j| format!("{}\t{}\t{}\t{}", j.job_id, j.status, j.pid.map(|p| p.to_string()).unwrap_or_default(), j.name))
                        .collect();
                    ToolOutput::ok(&call.id, lines.join("\n"))
                }
                Err(e) => ToolOutput::err(&call.id, format!("list error: {e}")),
            },
            "status" => {
                let Some(job_id) = job_id else { return ToolOutput::err(&call.id, "action=status requires 'job_id'") };
                match store.status(&job_id).await {
                    Ok(s) => ToolOutput::ok(
                        &call.id,
                        format!("job_id={}\nname={}\ncommand={}\npid={}\nstatus={}", s.job_id, s.name, s.command, s.pid.map(|p| p.to_string()).unwrap_or_default(), s.status),
                    ),
                    Err(e) => ToolOutput::err(&call.id, format!("status error: {e}")),
                }
            }
            "output" => {
                let Some(job_id) = job_id else { return ToolOutput::err(&call.id, "action=output requires 'job_id'") };
                match store.output(&job_id, lines).await {
                    Ok(out) => ToolOutput::ok(&call.id, if out.is_empty() { "(no output yet)".to_string() } else { out }),
                    Err(e) => ToolOutput::err(&call.id, format!("output error: {e}")),
                }
            }
            "kill" => {
                let Some(job_id) = job_id else { return ToolOutput::err(&call.id, "action=kill requires 'job_id'") };
                match store.kill(&job_id).await {
                    Ok(()) => ToolOutput::ok(&call.id, format!("sent SIGTERM to job {job_id}")),
                    Err(e) => ToolOutput::err(&call.id, format!("kill error: {e}")),
                }
            }
            other => ToolOutput::err(&call.id, format!("unknown action '{other}'; expected list/status/output/kill")),
        }
    }
}
