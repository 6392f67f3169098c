// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared path-sandboxing helper for filesystem tools.
//!
//! When a workspace root is configured, `read_file`/`write_file`/`edit_file`/
//! `list_dir` must never resolve outside of it (§8 invariant). Sandboxing is
//! advisory-off when no root is configured, matching the teacher's opt-in
//! config style elsewhere.
use std::path::{Path, PathBuf};

/// Resolve `requested` against `workspace_root`, rejecting any path that
/// would escape it once `..` components and symlinks are taken into account.
///
/// Returns the resolved absolute path on success, or a human-readable error
/// suitable for a [`crate::ToolOutput::err`].
pub fn resolve_in_workspace(workspace_root: &Option<PathBuf>, requested: &str) -> Result<PathBuf, String> {
    let root = match workspace_root {
        Some(r) => r,
        None => return Ok(PathBuf::from(requested)),
    };

    let candidate = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        root.join(requested)
    };

    let root_canon = root.canonicalize().unwrap_or_else(|_| root.clone());
    // The file may not exist yet (write_file creating a new file), so canonicalize
    // the deepest existing ancestor and re-attach the remaining components.
    let resolved = canonicalize_best_effort(&candidate);

    if resolved.starts_with(&root_canon) {
        Ok(resolved)
    } else {
        Err(format!(
            "forbidden_path: {} is outside the configured workspace ({})",
            candidate.display(),
            root.display()
        ))
    }
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if let Ok(c) = path.canonicalize() {
        return c;
    }
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(c) = existing.canonicalize() {
            let mut result = c;
            for component in tail.iter().rev() {
                result.push(component);
            }
            return result;
        }
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing = existing.parent().map(Path::to_path_buf).unwrap_or_default();
            }
            None => {
                let mut result = existing;
                for component in tail.iter().rev() {
                    result.push(component);
                }
                return result;
            }
        }
    }
}
