// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable, append-only conversation history keyed by an opaque session key.
//!
//! Each session lives as its own `.jsonl` file: one JSON object per line.
//! Tool-call arguments and tool results are truncated before being written
//! (see [`truncate`]) so a single verbose turn cannot grow a session file
//! without bound; the live, untruncated copy used for the current turn's
//! prompt never passes through this crate.

mod record;
mod store;
mod truncate;

pub use record::{ContentBlock, RecordContent, SessionRecord, ToolCallRecord};
pub use store::{Session, SessionError, SessionStore};
pub use truncate::{truncate_argument, truncate_result, MAX_ARG_CHARS, MAX_RESULT_CHARS};

/// Replace any character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
