// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Mandatory truncation applied to tool-call arguments and tool results
//! before they are written to durable history. Never applied to the live
//! copy of a tool result returned to the current turn.

use pocket_tools::OutputCategory;

/// Tool-call argument strings longer than this are truncated before append.
pub const MAX_ARG_CHARS: usize = 500;
/// Tool-result strings longer than this are truncated before append.
pub const MAX_RESULT_CHARS: usize = 2000;

fn marker(total_chars: usize, kept_chars: usize) -> String {
    format!("\u{2026} [truncated {} chars]", total_chars - kept_chars)
}

/// Truncate a tool-call argument string to [`MAX_ARG_CHARS`] plus a marker.
pub fn truncate_argument(s: &str) -> String {
    let total = s.chars().count();
    if total <= MAX_ARG_CHARS {
        return s.to_string();
    }
    let head: String = s.chars().take(MAX_ARG_CHARS).collect();
    format!("{head}{}", marker(total, MAX_ARG_CHARS))
}

/// Truncate a tool-result string to [`MAX_RESULT_CHARS`], choosing which
/// characters to keep based on the tool's declared [`OutputCategory`].
pub fn truncate_result(s: &str, category: OutputCategory) -> String {
    let total = s.chars().count();
    if total <= MAX_RESULT_CHARS {
        return s.to_string();
    }
    match category {
        OutputCategory::HeadTail => head_tail_window(s, total),
        OutputCategory::MatchList | OutputCategory::FileContent | OutputCategory::Generic => {
            let head: String = s.chars().take(MAX_RESULT_CHARS).collect();
            format!("{head}{}", marker(total, MAX_RESULT_CHARS))
        }
    }
}

/// Keep a leading 2/3 window and a trailing 1/3 window of `s`, separated by
/// the truncation marker.
fn head_tail_window(s: &str, total: usize) -> String {
    let head_len = MAX_RESULT_CHARS * 2 / 3;
    let tail_len = MAX_RESULT_CHARS - head_len;
    let chars: Vec<char> = s.chars().collect();
    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[chars.len() - tail_len..].iter().collect();
    format!("{head}{}{tail}", marker(total, head_len + tail_len))
}
