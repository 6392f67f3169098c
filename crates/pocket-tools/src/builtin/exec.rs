// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(unix)]
use libc;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::jobs::{JobStore, JOB_OUTPUT_CAP_BYTES};
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Timeout for commands classified as "quick" (ls, cat, pwd, ...).
const QUICK_TIMEOUT_SECS: u64 = 30;
/// Default timeout for "standard" commands.
const STANDARD_TIMEOUT_SECS: u64 = 120;
/// Hard ceiling even when the caller passes an explicit `timeout`.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Leading-word commands that are always classified "quick" regardless of
/// their arguments.
const QUICK_COMMANDS: &[&str] = &[
    "ls", "cat", "pwd", "echo", "which", "type", "file", "stat", "test", "cd",
];

/// Classification of a command's expected runtime and side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Quick,
    Standard,
    LongRunning,
}

/// Built-in tool that runs a shell command, classifying it by expected
/// duration so long builds/installs are auto-backgrounded instead of blocking
/// the agent loop for minutes.
pub struct ExecTool {
    pub workspace_root: Option<PathBuf>,
}

impl Default for ExecTool {
    fn default() -> Self {
        Self { workspace_root: None }
    }
}

impl ExecTool {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }

    fn jobs_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join(".pocketrb")
            .join("jobs")
    }
}

fn dangerous_patterns() -> &'static [Regex] {
    use std::sync::OnceLock;
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+(/\s*$|/\*|~\s*$|~/\*)",
            r"\bmkfs(\.\w+)?\b",
            r"\bdd\b.*\bof=/dev/(sd|nvme|hd|disk)",
            r"\b(shutdown|reboot|halt|poweroff)\b",
            r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static dangerous pattern is valid regex"))
        .collect()
    })
}

/// Substrings that mark a command as likely long-running: package installs,
/// builds, clones, or explicit backgrounding.
const LONG_RUNNING_MARKERS: &[&str] = &[
    "npm install",
    "npm ci",
    "yarn install",
    "pip install",
    "cargo build",
    "cargo install",
    "apt install",
    "apt-get install",
    "apt-get upgrade",
    "git clone",
    "make ",
    "docker build",
    "docker pull",
    " &", // explicit shell backgrounding
    "nohup",
];

fn is_dangerous(command: &str) -> bool {
    dangerous_patterns().iter().any(|re| re.is_match(command))
}

fn classify(command: &str) -> Classification {
    let trimmed = command.trim();
    let first_word = trimmed.split_whitespace().next().unwrap_or("");
    if QUICK_COMMANDS.contains(&first_word) {
        return Classification::Quick;
    }
    if LONG_RUNNING_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return Classification::LongRunning;
    }
    Classification::Standard
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str { "exec" }

    fn description(&self) -> &str {
        "Run a shell command.\n\
         Commands are classified automatically: quick commands (ls, cat, pwd, echo, which,\n\
         type, file, stat, test, cd) get a 30s timeout; commands that look long-running\n\
         (package installs, builds, git clone, explicit backgrounding) are auto-detached into\n\
         a background job instead of blocking; everything else gets 120s, up to 600s if you\n\
         pass an explicit timeout. Pass background=true to force detaching any command.\n\
         Destructive commands (rm of root-like paths, mkfs, raw device dd, shutdown/reboot,\n\
         fork bombs) are refused outright. Output beyond ~100 KiB is head/tail-truncated.\n\
         Use the jobs tool to poll, read output from, or kill a background job."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Explicit timeout override in seconds, capped at 600"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                },
                "background": {
                    "type": "boolean",
                    "description": "Force-detach this command as a background job (default false)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }

    fn output_category(&self) -> OutputCategory { OutputCategory::HeadTail }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'command'"),
        };
        let working_dir = call.args.get("working_dir").and_then(|v| v.as_str()).map(str::to_string);
        let explicit_timeout = call.args.get("timeout").and_then(|v| v.as_u64());
        let force_background = call.args.get("background").and_then(|v| v.as_bool()).unwrap_or(false);

        if is_dangerous(&command) {
            return ToolOutput::err(&call.id, format!("forbidden: refusing to run destructive command: {command}"));
        }

        let classification = classify(&command);
        debug!(command = %command, ?classification, "exec tool");

        if force_background || classification == Classification::LongRunning {
            let store = JobStore::new(self.jobs_root());
            return match store.spawn(&command, working_dir.as_deref()).await {
                Ok(job_id) => ToolOutput::ok(
                    &call.id,
                    format!("started background job {job_id}; use the jobs tool to check status/output"),
                ),
                Err(e) => ToolOutput::err(&call.id, format!("failed to start background job: {e}")),
            };
        }

        let timeout_secs = match explicit_timeout {
            Some(t) => t.min(MAX_TIMEOUT_SECS),
            None if classification == Classification::Quick => QUICK_TIMEOUT_SECS,
            None => STANDARD_TIMEOUT_SECS,
        };

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = &working_dir {
            cmd.current_dir(wd);
        }

        let result = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }
                if content.is_empty() {
                    content = format!("[exit {}]", output.status.code().unwrap_or(-1));
                }

                let code = output.status.code().unwrap_or(-1);
                if code == 0 {
                    ToolOutput::ok(&call.id, content)
                } else if code == 1 {
                    let out = if content.is_empty() { "[exit 1]".to_string() } else { format!("[exit 1]\n{content}") };
                    ToolOutput::ok(&call.id, out)
                } else {
                    ToolOutput::err(&call.id, format!("[exit {code}]\n{content}"))
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("timeout after {timeout_secs}s")),
        }
    }
}

/// Head/tail-truncate `s` to roughly `JOB_OUTPUT_CAP_BYTES`, noting how much
/// was dropped in the middle.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= JOB_OUTPUT_CAP_BYTES {
        return s.to_string();
    }
    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();
    const HEAD_LINES: usize = 60;
    const TAIL_LINES: usize = 40;

    if total <= HEAD_LINES + TAIL_LINES {
        let tail_start = s.len().saturating_sub(JOB_OUTPUT_CAP_BYTES / 2);
        let tail_str = &s[tail_start..];
        let head_end = (JOB_OUTPUT_CAP_BYTES / 2).min(s.len());
        let head_str = &s[..head_end];
        let omitted_bytes = s.len() - head_str.len() - tail_str.len();
        return format!("{head_str}\n...[{omitted_bytes} bytes omitted]...\n{tail_str}");
    }

    let head: Vec<&str> = lines[..HEAD_LINES].to_vec();
    let tail: Vec<&str> = lines[total - TAIL_LINES..].to_vec();
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let shown_bytes = head.join("\n").len() + tail.join("\n").len();
    let omitted_bytes = s.len().saturating_sub(shown_bytes);

    format!(
        "{}\n...[{} lines / ~{} bytes omitted]...\n{}",
        head.join("\n"),
        omitted_lines,
        omitted_bytes,
        tail.join("\n")
    )
}
