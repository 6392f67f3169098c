// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use serde_json::Value;

/// Emitted once per tool invocation, successful or not.
///
/// The agent loop forwards these onto the bus's tool-events queue so
/// channels and observers can watch tool activity without polling the
/// session store.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: Value,
    pub outcome: ToolOutcome,
    pub duration: Duration,
}

/// Exactly one of `Ok`/`Err` per execution (§3 `ToolExecution` invariant).
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok(String),
    Err(String),
}

impl ToolExecution {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Err(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_error_true_for_err_outcome() {
        let ev = ToolExecution {
            tool_call_id: "c1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({}),
            outcome: ToolOutcome::Err("boom".into()),
            duration: Duration::from_millis(5),
        };
        assert!(ev.is_error());
    }

    #[test]
    fn is_error_false_for_ok_outcome() {
        let ev = ToolExecution {
            tool_call_id: "c1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({}),
            outcome: ToolOutcome::Ok("contents".into()),
            duration: Duration::from_millis(5),
        };
        assert!(!ev.is_error());
    }
}
