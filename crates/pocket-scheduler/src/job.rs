// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum interval for an `every` schedule — guards against a misconfigured
/// job hammering the tick loop.
pub const MIN_EVERY_MS: u64 = 60_000;

/// When a job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fires once at the given instant.
    At { at: DateTime<Utc> },
    /// Fires every `every_ms` milliseconds, starting `every_ms` after
    /// creation or after the previous run.
    Every { every_ms: u64 },
    /// Fires at each instant matching a standard 5-field
    /// minute/hour/day-of-month/month/day-of-week cron expression,
    /// evaluated in UTC.
    Cron { expression: String },
}

impl Schedule {
    /// The next firing instant strictly after `now`, or `None` once the
    /// schedule is exhausted (only possible for `At`).
    pub fn next_after(&self, now: DateTime<Utc>) -> anyhow::Result<Option<DateTime<Utc>>> {
        match self {
            Schedule::At { at } => Ok(if *at > now { Some(*at) } else { None }),
            Schedule::Every { every_ms } => {
                Ok(Some(now + chrono::Duration::milliseconds(*every_ms as i64)))
            }
            Schedule::Cron { expression } => {
                // The `cron` crate expects a leading seconds field; the
                // scheduled-job surface only exposes the standard 5-field
                // minute/hour/dom/mon/dow form, so the seconds field is fixed
                // at `0`.
                let full = format!("0 {expression}");
                let schedule = cron::Schedule::from_str(&full)
                    .map_err(|e| anyhow::anyhow!("invalid cron expression {expression:?}: {e}"))?;
                Ok(schedule.after(&now).next())
            }
        }
    }
}

/// What a job delivers when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// The message text carried by the job.
    pub content: String,
    /// `false` (default): deliver as a synthetic inbound message that the
    /// agent loop processes like any other turn.
    /// `true`: publish directly as an outbound message to `channel`/`chat_id`,
    /// bypassing the agent.
    #[serde(default)]
    pub deliver: bool,
    /// Target channel when `deliver` is `true`.
    #[serde(default)]
    pub channel: Option<String>,
    /// Target chat when `deliver` is `true`.
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// A scheduled job as persisted in the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub schedule: Schedule,
    pub payload: JobPayload,
    pub enabled: bool,
    pub delete_after_run: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
