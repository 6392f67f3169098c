// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Local;
use std::path::Path;

/// Ambient context folded into the system prompt for every turn.
///
/// Everything here is either stable for the lifetime of the process
/// (`workspace_root`) or cheap to recompute per-turn (`memory_summary`,
/// `skill_content`) — callers are expected to build a fresh
/// [`SystemPromptContext`] each time a prompt is assembled rather than cache
/// the rendered string.
#[derive(Debug, Default)]
pub struct SystemPromptContext<'a> {
    /// Root directory tools are sandboxed to, if any.
    pub workspace_root: Option<&'a Path>,
    /// A short summary retrieved from the memory store, if it returned one.
    pub memory_summary: Option<&'a str>,
    /// Concatenated body of always-on skills plus any skill whose trigger
    /// matched the current inbound message. Opaque to the core — rendered
    /// verbatim.
    pub skill_content: Option<&'a str>,
    /// Text appended verbatim after the guidelines section, e.g. an
    /// operator-supplied `system_prompt` override suffix.
    pub append: Option<&'a str>,
}

fn build_guidelines_section() -> String {
    "## Guidelines\n\n\
     - Be concise and precise. Use tools instead of guessing.\n\
     - Prefer `edit_file` over `write_file` for modifying existing files (preserves surrounding context).\n\
     - Use `list_dir` and `read_file` to explore before acting; do not assume file layout.\n\
     - Tool calls within a single turn run one at a time, in the order you request them — a later \
       call can rely on the side effects of an earlier one.\n\
     - Use `exec` only for commands that genuinely need a shell; never for file reads or writes.\n\
     - Use `think` to reason over a problem without producing user-visible output or side effects.\n\
     - Use `memory` to persist durable facts about the user or project across sessions; check it \
       at the start of a new conversation rather than re-deriving context.\n\
     - Use `cron` to schedule follow-up work instead of trying to block and wait.\n\
     - When a tool fails, read its error and try a different approach rather than repeating the \
       same call."
        .to_string()
}

/// Build the system prompt for one turn.
///
/// `custom` overrides the default identity/guidelines entirely (an operator
/// may supply their own `system_prompt` in configuration); `ctx.append` is
/// still honoured in that case so operators can extend rather than replace.
pub fn system_prompt(custom: Option<&str>, ctx: SystemPromptContext<'_>) -> String {
    if let Some(custom) = custom {
        if let Some(extra) = ctx.append {
            return format!("{}\n\n{}", custom.trim_end(), extra);
        }
        return custom.to_string();
    }

    let identity = format!(
        "You are a multi-channel AI assistant running as a long-lived background process.\n\n\
         Current date and time: `{now}`",
        now = Local::now().format("%Y-%m-%d %H:%M:%S"),
    );

    let workspace_section = if let Some(root) = ctx.workspace_root {
        format!(
            "\n\n## Workspace\n\
             File and shell tools are sandboxed to: `{}`\n\
             - Relative paths are resolved against this root.\n\
             - Absolute paths outside this root are rejected.",
            root.display()
        )
    } else {
        String::new()
    };

    let memory_section = if let Some(summary) = ctx.memory_summary.filter(|s| !s.trim().is_empty()) {
        format!("\n\n## Memory\n\n{summary}")
    } else {
        String::new()
    };

    let skill_section = if let Some(content) = ctx.skill_content.filter(|s| !s.trim().is_empty()) {
        format!("\n\n## Skills\n\n{content}")
    } else {
        String::new()
    };

    let guidelines_section = build_guidelines_section();

    let append_section = if let Some(extra) = ctx.append {
        format!("\n\n{extra}")
    } else {
        String::new()
    };

    format!(
        "{identity}{workspace_section}{memory_section}{skill_section}\n\n\
         {guidelines_section}\
         {append_section}",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn empty() -> SystemPromptContext<'static> {
        SystemPromptContext::default()
    }

    #[test]
    fn custom_prompt_is_returned_verbatim() {
        let prompt = system_prompt(Some("Custom instructions here."), empty());
        assert_eq!(prompt, "Custom instructions here.");
    }

    #[test]
    fn custom_prompt_with_append() {
        let ctx = SystemPromptContext { append: Some("Extra rule."), ..Default::default() };
        let prompt = system_prompt(Some("Base."), ctx);
        assert!(prompt.contains("Base."));
        assert!(prompt.contains("Extra rule."));
    }

    #[test]
    fn default_prompt_includes_guidelines() {
        let pr = system_prompt(None, empty());
        assert!(pr.contains("## Guidelines"));
        assert!(pr.contains("think"));
    }

    #[test]
    fn no_workspace_no_section() {
        let pr = system_prompt(None, empty());
        assert!(!pr.contains("## Workspace"));
    }

    #[test]
    fn workspace_root_appears_in_prompt() {
        let root = PathBuf::from("/home/user/project");
        let ctx = SystemPromptContext { workspace_root: Some(&root), ..Default::default() };
        let pr = system_prompt(None, ctx);
        assert!(pr.contains("/home/user/project"));
        assert!(pr.contains("## Workspace"));
    }

    #[test]
    fn memory_summary_appears_when_present() {
        let ctx = SystemPromptContext { memory_summary: Some("User prefers terse answers."), ..Default::default() };
        let pr = system_prompt(None, ctx);
        assert!(pr.contains("## Memory"));
        assert!(pr.contains("User prefers terse answers."));
    }

    #[test]
    fn empty_memory_summary_omits_section() {
        let ctx = SystemPromptContext { memory_summary: Some("   "), ..Default::default() };
        let pr = system_prompt(None, ctx);
        assert!(!pr.contains("## Memory"));
    }

    #[test]
    fn skill_content_is_injected() {
        let ctx = SystemPromptContext { skill_content: Some("Always answer in haiku."), ..Default::default() };
        let pr = system_prompt(None, ctx);
        assert!(pr.contains("## Skills"));
        assert!(pr.contains("Always answer in haiku."));
    }

    #[test]
    fn append_comes_after_guidelines() {
        let ctx = SystemPromptContext { append: Some("Trailing note."), ..Default::default() };
        let pr = system_prompt(None, ctx);
        let g = pr.find("## Guidelines").unwrap();
        let a = pr.find("Trailing note.").unwrap();
        assert!(a > g);
    }
}
