// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::debug;

use pocket_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::sandbox::resolve_in_workspace;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Exact-match, surgical file edit: find `old_string` in the file and replace
/// it with `new_string`. Fails rather than guessing when the match is absent
/// or ambiguous, unlike a diff-apply tool that tries to be clever about it.
#[derive(Default)]
pub struct EditFileTool {
    pub workspace_root: Option<PathBuf>,
}

impl EditFileTool {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str { "edit_file" }

    fn description(&self) -> &str {
        "Replace an exact occurrence of old_string with new_string in a file.\n\
         old_string must appear verbatim (including whitespace/indentation) and must\n\
         be unique unless replace_all=true, in which case every occurrence is replaced.\n\
         Fails without writing anything if old_string is not found (returns up to 3\n\
         similar lines as a hint) or if it is ambiguous and replace_all is not set.\n\
         Include enough surrounding context in old_string to make it unique."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Text to replace it with"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring a unique match (default false)"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }

    fn modes(&self) -> &[AgentMode] { &[AgentMode::Agent] }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_string'"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_string'"),
        };
        let replace_all = call.args.get("replace_all").and_then(|v| v.as_bool()).unwrap_or(false);

        if old_string.is_empty() {
            return ToolOutput::err(&call.id, "old_string must not be empty");
        }
        if old_string == new_string {
            return ToolOutput::err(&call.id, "old_string and new_string are identical; nothing to do");
        }

        let resolved = match resolve_in_workspace(&self.workspace_root, &path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        debug!(path = %path, replace_all, "edit_file tool");

        let original = match tokio::fs::read_to_string(&resolved).await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = original.matches(old_string.as_str()).count();

        if occurrences == 0 {
            let hints = find_similar_lines(&original, &old_string, 3);
            let mut msg = format!("old_string not found in {path}");
            if !hints.is_empty() {
                msg.push_str("\nsimilar lines:\n");
                for (line_no, line, score) in &hints {
                    msg.push_str(&format!("  L{line_no} ({:.0}% similar): {line}\n", score * 100.0));
                }
            }
            return ToolOutput::err(&call.id, msg);
        }

        if occurrences > 1 && !replace_all {
            return ToolOutput::err(
                &call.id,
                format!(
                    "old_string matches {occurrences} locations in {path}; pass replace_all=true \
                     to replace all of them, or include more context to make it unique"
                ),
            );
        }

        let updated = if replace_all {
            original.replace(old_string.as_str(), &new_string)
        } else {
            original.replacen(old_string.as_str(), &new_string, 1)
        };

        if let Err(e) = write_atomic(&resolved, &updated).await {
            return ToolOutput::err(&call.id, format!("write error: {e}"));
        }

        ToolOutput::ok(
            &call.id,
            format!("replaced {occurrences} occurrence(s) in {path}"),
        )
    }
}

/// Write `content` to `path` via a temp file + rename so a crash mid-write
/// never leaves a half-written file in place.
async fn write_atomic(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let tmp_path = dir.join(format!(".{}.tmp-{}", file_name(path), std::process::id()));
    tokio::fs::write(&tmp_path, content).await?;
    tokio::fs::rename(&tmp_path, path).await
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "file".into())
}

/// Character-level similarity in `[0.0, 1.0]`, based on the fraction of
/// matching (unchanged) text in a diff against `needle`.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    let matched: usize = diff
        .ops()
        .iter()
        .filter(|op| op.tag() == similar::DiffTag::Equal)
        .map(|op| op.new_range().len())
        .sum();
    let total = a.chars().count().max(b.chars().count());
    if total == 0 { 1.0 } else { matched as f64 / total as f64 }
}

/// Find up to `limit` lines of `haystack` most similar to the first line of
/// `needle`, for use as an error-message hint when an exact match fails.
fn find_similar_lines(haystack: &str, needle: &str, limit: usize) -> Vec<(usize, String, f64)> {
    let needle_first_line = needle.lines().next().unwrap_or(needle).trim();
    if needle_first_line.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, String, f64)> = haystack
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.to_string(), similarity_ratio(needle_first_line, line.trim())))
        .filter(|(_, _, score)| *score > 0.3)
        .collect();
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "edit_file".into(), args }
    }

    fn tmp_file(content: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/pocket_edit_file_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn replaces_unique_occurrence() {
        let path = tmp_file("hello world\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "world", "new_string": "rust"
        }))).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello rust\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn fails_when_old_string_not_found() {
        let path = tmp_file("hello world\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "not here", "new_string": "x"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
        // File must be unchanged.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn not_found_error_includes_similar_line_hint() {
        let path = tmp_file("function helloWorld() {}\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "function helloWorld2() {}", "new_string": "x"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("similar lines"), "{}", out.content);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn fails_on_ambiguous_match_without_replace_all() {
        let path = tmp_file("foo\nfoo\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "foo", "new_string": "bar"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("matches 2 locations"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn replace_all_replaces_every_occurrence() {
        let path = tmp_file("foo\nfoo\nfoo\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "foo", "new_string": "bar", "replace_all": true
        }))).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "bar\nbar\nbar\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn identical_old_and_new_is_rejected() {
        let path = tmp_file("same\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "same", "new_string": "same"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("identical"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_old_string_is_rejected() {
        let path = tmp_file("content\n");
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": path, "old_string": "", "new_string": "x"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("must not be empty"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let t = EditFileTool::default();
        let out = t.execute(&call(json!({
            "path": "/tmp/pocket_edit_no_such_file.txt", "old_string": "x", "new_string": "y"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("read error"));
    }

    #[test]
    fn similarity_ratio_identical_strings_is_one() {
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
    }

    #[test]
    fn similarity_ratio_completely_different_is_low() {
        assert!(similarity_ratio("abc", "xyz") < 0.3);
    }

    #[test]
    fn only_available_in_agent_mode() {
        let t = EditFileTool::default();
        assert_eq!(t.modes(), &[AgentMode::Agent]);
    }
}
