// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::store::{MemoryKind, MemoryRecord, MemoryStore};

/// Deterministic in-process memory store for tests. Facts never leave the
/// process and are lost on drop.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: MemoryKind, key: &str, value: &str) {
        self.records.lock().unwrap().push(MemoryRecord {
            kind,
            key: key.to_string(),
            value: value.to_string(),
            recorded_at: Utc::now(),
        });
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn remember_learned(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.push(MemoryKind::Learned, key, value);
        Ok(())
    }

    async fn remember_user(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.push(MemoryKind::User, key, value);
        Ok(())
    }

    async fn remember_preference(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.push(MemoryKind::Preference, key, value);
        Ok(())
    }

    async fn remember_context(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.push(MemoryKind::Context, key, value);
        Ok(())
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let q = query.to_lowercase();
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.key.to_lowercase().contains(&q) || r.value.to_lowercase().contains(&q))
            .cloned()
            .collect())
    }

    async fn relevant_context(&self, query: &str, max_facts: usize) -> anyhow::Result<String> {
        let hits = self.search(query).await?;
        let lines: Vec<String> = hits
            .into_iter()
            .take(max_facts)
            .map(|r| format!("[{}] {}: {}", r.kind.as_str(), r.key, r.value))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn recent_events(&self, n: usize) -> anyhow::Result<Vec<MemoryRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().rev().take(n).cloned().collect())
    }

    async fn stats(&self) -> anyhow::Result<HashMap<String, usize>> {
        let records = self.records.lock().unwrap();
        let mut counts: HashMap<String, usize> = HashMap::new();
        counts.insert("total".into(), records.len());
        for r in records.iter() {
            *counts.entry(r.kind.as_str().to_string()).or_default() += 1;
        }
        Ok(counts)
    }
}
