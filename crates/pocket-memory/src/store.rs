// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which `remember_*` bucket a fact was filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Learned,
    User,
    Preference,
    Context,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learned => "learned",
            Self::User => "user",
            Self::Preference => "preference",
            Self::Context => "context",
        }
    }
}

/// One stored fact, as returned by `search`/`recent_events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub kind: MemoryKind,
    pub key: String,
    pub value: String,
    pub recorded_at: DateTime<Utc>,
}

/// The hook the agent core exposes facts to and pulls context from. Backed by
/// a document store (skills/plans/memory files) that lives outside this
/// crate — only the contract is specified here. The core never assumes a
/// specific backing store, so it depends on this trait object, never on a
/// concrete implementation.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn remember_learned(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remember_user(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remember_preference(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remember_context(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Facts whose key or value matches `query`, most relevant first.
    async fn search(&self, query: &str) -> anyhow::Result<Vec<MemoryRecord>>;

    /// A prose blurb assembled from at most `max_facts` records relevant to
    /// `query`, suitable for splicing into a system prompt.
    async fn relevant_context(&self, query: &str, max_facts: usize) -> anyhow::Result<String>;

    /// The `n` most recently recorded facts across all kinds.
    async fn recent_events(&self, n: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Coarse counters, e.g. record count per `MemoryKind`.
    async fn stats(&self) -> anyhow::Result<HashMap<String, usize>>;
}
