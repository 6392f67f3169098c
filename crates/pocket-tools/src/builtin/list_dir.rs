// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::sandbox::resolve_in_workspace;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Default)]
pub struct ListDirTool {
    pub workspace_root: Option<PathBuf>,
}

impl ListDirTool {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory contents. path defaults to the workspace root. \
         recursive=true walks subdirectories (excludes .git/ target/ node_modules/). \
         pattern filters entries by glob against the file name (e.g. '*.rs'). \
         include_hidden=true shows dotfiles. Directories have a trailing /; \
         files show size in bytes and last-modified time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the directory (default: workspace root)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to filter entries by file name, e.g. '*.rs'"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Recurse into subdirectories (default false)"
                },
                "include_hidden": {
                    "type": "boolean",
                    "description": "Include dotfiles and dot-directories (default false)"
                }
            },
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".").to_string();
        let pattern = call.args.get("pattern").and_then(|v| v.as_str());
        let recursive = call.args.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
        let include_hidden = call.args.get("include_hidden").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_depth = if recursive { 5 } else { 0 };
        const LIMIT: usize = 500;

        let matcher = match pattern.map(glob_to_regex) {
            Some(Some(re)) => Some(re),
            Some(None) => return ToolOutput::err(&call.id, format!("invalid glob pattern: {}", pattern.unwrap())),
            None => None,
        };

        let resolved = match resolve_in_workspace(&self.workspace_root, &path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let resolved_str = resolved.to_string_lossy().into_owned();

        debug!(path = %resolved_str, recursive, include_hidden, "list_dir tool");

        match tokio::fs::metadata(&resolved).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("Not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("cannot access {path}: {e}")),
        }

        let mut entries: Vec<String> = Vec::new();
        let mut truncated = false;

        collect_entries(
            &resolved_str,
            &resolved_str,
            0,
            max_depth,
            LIMIT,
            include_hidden,
            matcher.as_ref(),
            &mut entries,
            &mut truncated,
        )
        .await;

        if entries.is_empty() {
            return ToolOutput::ok(&call.id, "(empty directory)");
        }

        let mut output = entries.join("\n");
        if truncated {
            output.push_str(&format!("\n...[output truncated at {} entries]", LIMIT));
        }

        ToolOutput::ok(&call.id, output)
    }
}

static EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".svn",
    "__pycache__",
    ".mypy_cache",
];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

fn relative_path(base: &str, full: &str) -> String {
    if let Some(stripped) = full.strip_prefix(base) {
        stripped.trim_start_matches('/').to_string()
    } else {
        full.to_string()
    }
}

/// Convert a simple shell glob pattern (`*`/`?`) to a [`Regex`] matched
/// against a bare file name.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

fn format_entry(rel: &str, is_dir: bool, len: u64, modified: Option<std::time::SystemTime>) -> String {
    if is_dir {
        return format!("{}/", rel);
    }
    let mtime = modified
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{rel}\t{len}B\tmtime={mtime}")
}

#[allow(clippy::too_many_arguments)]
#[async_recursion::async_recursion]
async fn collect_entries(
    base: &str,
    dir: &str,
    current_depth: usize,
    max_depth: usize,
    limit: usize,
    include_hidden: bool,
    matcher: Option<&Regex>,
    entries: &mut Vec<String>,
    truncated: &mut bool,
) {
    if entries.len() >= limit {
        *truncated = true;
        return;
    }

    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut children: Vec<(String, bool, u64, Option<std::time::SystemTime>)> = Vec::new();
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !include_hidden && name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await.ok();
        let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let len = meta.as_ref().map(|m| m.len()).unwrap_or(0);
        let modified = meta.as_ref().and_then(|m| m.modified().ok());
        children.push((name, is_dir, len, modified));
    }
    children.sort_by(|(a, a_dir, ..), (b, b_dir, ..)| {
        // Directories first, then alphabetical
        b_dir.cmp(a_dir).then(a.cmp(b))
    });

    for (name, is_dir, len, modified) in children {
        if entries.len() >= limit {
            *truncated = true;
            return;
        }
        let full_path = format!("{}/{}", dir.trim_end_matches('/'), name);
        let rel = relative_path(base, &full_path);
        let matches_pattern = matcher.map(|re| re.is_match(&name)).unwrap_or(true);

        if is_dir {
            // Directories that don't match a pattern are still shown so the
            // model can navigate into them, but files must match.
            if matcher.is_none() || matches_pattern {
                entries.push(format_entry(&rel, true, 0, None));
            }
            if current_depth < max_depth && !is_excluded(&name) {
                collect_entries(
                    base,
                    &full_path,
                    current_depth + 1,
                    max_depth,
                    limit,
                    include_hidden,
                    matcher,
                    entries,
                    truncated,
                )
                .await;
            }
        } else if matches_pattern {
            entries.push(format_entry(&rel, false, len, modified));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "l1".into(),
            name: "list_dir".into(),
            args,
        }
    }

    #[tokio::test]
    async fn lists_directory_contents() {
        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": "/tmp"}))).await;
        assert!(!out.is_error, "{}", out.content);
    }

    #[tokio::test]
    async fn dirs_have_trailing_slash() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_{}_{n}", std::process::id());
        std::fs::create_dir_all(format!("{dir}/subdir")).unwrap();
        std::fs::write(format!("{dir}/file.txt"), "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir}))).await;
        assert!(
            out.content.contains("subdir/"),
            "dirs should have trailing slash"
        );
        assert!(out.content.contains("file.txt"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn files_show_size_and_mtime() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_meta_{}_{n}", std::process::id());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(format!("{dir}/file.txt"), "hello").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir}))).await;
        assert!(out.content.contains("5B"), "{}", out.content);
        assert!(out.content.contains("mtime="), "{}", out.content);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn pattern_filters_files_by_glob() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_pattern_{}_{n}", std::process::id());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(format!("{dir}/a.rs"), "x").unwrap();
        std::fs::write(format!("{dir}/b.txt"), "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir, "pattern": "*.rs"}))).await;
        assert!(out.content.contains("a.rs"));
        assert!(!out.content.contains("b.txt"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn hidden_files_excluded_by_default() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_hidden_{}_{n}", std::process::id());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(format!("{dir}/.secret"), "x").unwrap();
        std::fs::write(format!("{dir}/visible.txt"), "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir}))).await;
        assert!(!out.content.contains(".secret"));
        assert!(out.content.contains("visible.txt"));

        let out_with_hidden = t.execute(&call(json!({"path": dir, "include_hidden": true}))).await;
        assert!(out_with_hidden.content.contains(".secret"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn recursive_false_shows_only_immediate_children() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_depth_{}_{n}", std::process::id());
        std::fs::create_dir_all(format!("{dir}/subdir/nested")).unwrap();
        std::fs::write(format!("{dir}/top.txt"), "x").unwrap();
        std::fs::write(format!("{dir}/subdir/inner.txt"), "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir}))).await;
        assert!(out.content.contains("top.txt"));
        assert!(out.content.contains("subdir/"));
        assert!(
            !out.content.contains("inner.txt"),
            "inner.txt should not appear without recursive"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn recursive_true_descends_into_subdirectories() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/pocket_listdir_rec_{}_{n}", std::process::id());
        std::fs::create_dir_all(format!("{dir}/subdir")).unwrap();
        std::fs::write(format!("{dir}/subdir/inner.txt"), "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": dir, "recursive": true}))).await;
        assert!(out.content.contains("inner.txt"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_path_is_not_a_directory_error() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/pocket_listdir_file_{}_{n}.txt", std::process::id());
        std::fs::write(&path, "x").unwrap();

        let t = ListDirTool::default();
        let out = t.execute(&call(json!({"path": path}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("Not a directory"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn nonexistent_dir_is_error() {
        let t = ListDirTool::default();
        let out = t
            .execute(&call(json!({"path": "/tmp/pocket_no_such_dir_xyzzy_99999"})))
            .await;
        assert!(out.is_error);
    }
}
