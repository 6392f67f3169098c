// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use pocket_model::Message;
use pocket_tools::OutputCategory;

use crate::record::{apply_truncation, SessionRecord};
use crate::sanitize_key;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A point-in-time snapshot of a session's durable state.
///
/// Returned by value from [`SessionStore::get`]/[`SessionStore::get_or_create`]
/// so callers can read freely without holding any lock; mutation goes back
/// through the store (`append_message`, `save`), never through this struct
/// directly.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

struct CachedSession {
    messages: Vec<Message>,
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
}

impl CachedSession {
    fn fresh() -> Self {
        Self { messages: Vec::new(), metadata: Map::new(), created_at: Utc::now() }
    }

    fn snapshot(&self, key: &str) -> Session {
        Session {
            key: key.to_string(),
            messages: self.messages.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}

/// Durable per-session append-only history, one `.jsonl` file per session key.
///
/// A single store-wide mutex guards the cache map (and the decision of
/// whether a session needs loading from disk); a per-session mutex then
/// guards that session's in-memory message list and serializes its own file
/// writes, so concurrent appends to different sessions never contend on the
/// same lock.
pub struct SessionStore {
    storage_dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<Mutex<CachedSession>>>>,
}

impl SessionStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self { storage_dir: storage_dir.into(), cache: Mutex::new(HashMap::new()) }
    }

    fn path_for(&self, sanitized: &str) -> PathBuf {
        self.storage_dir.join(format!("{sanitized}.jsonl"))
    }

    async fn load_from_disk(&self, sanitized: &str) -> std::io::Result<Option<CachedSession>> {
        let path = self.path_for(sanitized);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut messages = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => messages.push(record.to_message()),
                Err(e) => warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping corrupt session line"
                ),
            }
        }
        Ok(Some(CachedSession { messages, metadata: Map::new(), created_at: Utc::now() }))
    }

    /// Return the cached session, the one loaded from disk, or a fresh one —
    /// inserting it into the cache either way.
    pub async fn get_or_create(&self, key: &str) -> Session {
        let sanitized = sanitize_key(key);
        let mut cache = self.cache.lock().await;
        if let Some(handle) = cache.get(&sanitized) {
            return handle.lock().await.snapshot(key);
        }
        let cached = match self.load_from_disk(&sanitized).await {
            Ok(Some(c)) => c,
            Ok(None) => CachedSession::fresh(),
            Err(e) => {
                warn!(key = %key, error = %e, "session file unreadable, starting a fresh session");
                CachedSession::fresh()
            }
        };
        let snapshot = cached.snapshot(key);
        cache.insert(sanitized, Arc::new(Mutex::new(cached)));
        snapshot
    }

    /// Return the cached/loaded session, or `None` if neither a cache entry
    /// nor a backing file exists. An unreadable (but present) file still
    /// yields a fresh empty session, per the store's failure semantics.
    pub async fn get(&self, key: &str) -> Option<Session> {
        let sanitized = sanitize_key(key);
        let mut cache = self.cache.lock().await;
        if let Some(handle) = cache.get(&sanitized) {
            return Some(handle.lock().await.snapshot(key));
        }
        match self.load_from_disk(&sanitized).await {
            Ok(Some(cached)) => {
                let snapshot = cached.snapshot(key);
                cache.insert(sanitized, Arc::new(Mutex::new(cached)));
                Some(snapshot)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "session file unreadable, starting a fresh session");
                let cached = CachedSession::fresh();
                let snapshot = cached.snapshot(key);
                cache.insert(sanitized, Arc::new(Mutex::new(cached)));
                Some(snapshot)
            }
        }
    }

    /// Append one message to `key`'s history, truncating oversized tool-call
    /// arguments and oversized tool-result content (per `category`) before
    /// writing. On I/O failure the in-memory message list is left untouched.
    pub async fn append_message(
        &self,
        key: &str,
        message: Message,
        category: OutputCategory,
    ) -> Result<(), SessionError> {
        let sanitized = sanitize_key(key);
        let handle = {
            let mut cache = self.cache.lock().await;
            if let Some(h) = cache.get(&sanitized) {
                h.clone()
            } else {
                let cached = match self.load_from_disk(&sanitized).await {
                    Ok(Some(c)) => c,
                    Ok(None) => CachedSession::fresh(),
                    Err(e) => {
                        warn!(key = %key, error = %e, "session file unreadable, starting a fresh session");
                        CachedSession::fresh()
                    }
                };
                let arc = Arc::new(Mutex::new(cached));
                cache.insert(sanitized.clone(), arc.clone());
                arc
            }
        };

        let mut record = SessionRecord::from(&message);
        apply_truncation(&mut record, category);
        let line = serde_json::to_string(&record)?;

        let mut guard = handle.lock().await;
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let path = self.path_for(&sanitized);
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        guard.messages.push(record.to_message());
        Ok(())
    }

    /// Atomically rewrite the whole session record (temp file + rename).
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let sanitized = sanitize_key(&session.key);

        let mut buf = String::new();
        for message in &session.messages {
            let mut record = SessionRecord::from(message);
            apply_truncation(&mut record, OutputCategory::Generic);
            buf.push_str(&serde_json::to_string(&record)?);
            buf.push('\n');
        }

        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let path = self.path_for(&sanitized);
        let tmp_path = self.storage_dir.join(format!(".{sanitized}.jsonl.tmp-{}", std::process::id()));
        tokio::fs::write(&tmp_path, &buf).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        let cached = CachedSession {
            messages: session.messages.clone(),
            metadata: session.metadata.clone(),
            created_at: session.created_at,
        };
        self.cache.lock().await.insert(sanitized, Arc::new(Mutex::new(cached)));
        Ok(())
    }

    /// Remove the cache entry and the backing file. Missing file is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let sanitized = sanitize_key(key);
        self.cache.lock().await.remove(&sanitized);
        let path = self.path_for(&sanitized);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    /// Union of cached and on-disk session keys (sanitized form).
    pub async fn list_keys(&self) -> Result<Vec<String>, SessionError> {
        let cache = self.cache.lock().await;
        let mut keys: HashSet<String> = cache.keys().cloned().collect();
        drop(cache);

        match tokio::fs::read_dir(&self.storage_dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    if let Some(name) = entry.file_name().to_str() {
                        if let Some(stem) = name.strip_suffix(".jsonl") {
                            keys.insert(stem.to_string());
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SessionError::Io(e)),
        }

        let mut out: Vec<String> = keys.into_iter().collect();
        out.sort();
        Ok(out)
    }

    /// Test-harness only: drop every cache entry and delete every session file.
    pub async fn clear_all(&self) -> Result<(), SessionError> {
        self.cache.lock().await.clear();
        match tokio::fs::read_dir(&self.storage_dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                        let _ = tokio::fs::remove_file(&path).await;
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pocket_session_test_{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn get_or_create_returns_fresh_session_for_unknown_key() {
        let store = SessionStore::new(tmp_dir());
        let session = store.get_or_create("abc").await;
        assert_eq!(session.key, "abc");
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_key() {
        let store = SessionStore::new(tmp_dir());
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn append_then_get_or_create_sees_the_message() {
        let store = SessionStore::new(tmp_dir());
        store.append_message("s1", Message::user("hello"), OutputCategory::Generic).await.unwrap();
        let session = store.get_or_create("s1").await;
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn append_persists_across_store_instances() {
        let dir = tmp_dir();
        {
            let store = SessionStore::new(&dir);
            store.append_message("s1", Message::user("hi"), OutputCategory::Generic).await.unwrap();
        }
        let store2 = SessionStore::new(&dir);
        let session = store2.get_or_create("s1").await;
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn filename_is_derived_from_sanitized_key() {
        let dir = tmp_dir();
        let store = SessionStore::new(&dir);
        store.append_message("telegram:chat/42", Message::user("hi"), OutputCategory::Generic).await.unwrap();
        assert!(dir.join("telegram_chat_42.jsonl").exists());
    }

    #[tokio::test]
    async fn long_tool_call_arguments_are_truncated_on_append() {
        use pocket_model::{FunctionCall, MessageContent, Role};
        let store = SessionStore::new(tmp_dir());
        let long_args = "a".repeat(1000);
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: "c1".into(),
                function: FunctionCall { name: "exec".into(), arguments: long_args },
            },
        };
        store.append_message("s1", msg, OutputCategory::Generic).await.unwrap();
        let session = store.get_or_create("s1").await;
        match &session.messages[0].content {
            MessageContent::ToolCall { function, .. } => {
                assert!(function.arguments.len() < 1000);
                assert!(function.arguments.contains("truncated"));
            }
            _ => panic!("expected tool call"),
        }
    }

    #[tokio::test]
    async fn long_tool_result_is_truncated_per_category() {
        let store = SessionStore::new(tmp_dir());
        let long_result = "x".repeat(3000);
        store
            .append_message("s1", Message::tool_result("c1", long_result.clone()), OutputCategory::Generic)
            .await
            .unwrap();
        let session = store.get_or_create("s1").await;
        let content = session.messages[0].as_text().unwrap_or("");
        // as_text() only covers Text/single-part content; tool_result content
        // is read separately below since it is the ToolResult variant.
        let _ = content;
        match &session.messages[0].content {
            pocket_model::MessageContent::ToolResult { content, .. } => {
                let text = content.as_text().unwrap();
                assert!(text.len() < long_result.len());
                assert!(text.contains("truncated"));
            }
            _ => panic!("expected tool result"),
        }
    }

    #[tokio::test]
    async fn corrupt_line_is_skipped_not_fatal() {
        let dir = tmp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("s1.jsonl");
        tokio::fs::write(&path, "{\"role\":\"user\",\"content\":\"ok\"}\nnot json at all\n").await.unwrap();
        let store = SessionStore::new(&dir);
        let session = store.get_or_create("s1").await;
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].as_text(), Some("ok"));
    }

    #[tokio::test]
    async fn unreadable_file_yields_fresh_session() {
        let dir = tmp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        // A directory where a file is expected makes the read fail with something
        // other than NotFound.
        tokio::fs::create_dir_all(dir.join("s1.jsonl")).await.unwrap();
        let store = SessionStore::new(&dir);
        let session = store.get_or_create("s1").await;
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn save_rewrites_whole_file() {
        let store = SessionStore::new(tmp_dir());
        store.append_message("s1", Message::user("first"), OutputCategory::Generic).await.unwrap();
        let mut session = store.get_or_create("s1").await;
        session.messages = vec![Message::user("only")];
        store.save(&session).await.unwrap();
        let reloaded = store.get_or_create("s1").await;
        assert_eq!(reloaded.messages.len(), 1);
        assert_eq!(reloaded.messages[0].as_text(), Some("only"));
    }

    #[tokio::test]
    async fn delete_removes_cache_and_file() {
        let dir = tmp_dir();
        let store = SessionStore::new(&dir);
        store.append_message("s1", Message::user("hi"), OutputCategory::Generic).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(!dir.join("s1.jsonl").exists());
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn delete_missing_session_is_not_an_error() {
        let store = SessionStore::new(tmp_dir());
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn list_keys_unions_cache_and_disk() {
        let dir = tmp_dir();
        let store = SessionStore::new(&dir);
        store.append_message("s1", Message::user("a"), OutputCategory::Generic).await.unwrap();
        store.append_message("s2", Message::user("b"), OutputCategory::Generic).await.unwrap();
        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[tokio::test]
    async fn clear_all_removes_everything() {
        let dir = tmp_dir();
        let store = SessionStore::new(&dir);
        store.append_message("s1", Message::user("a"), OutputCategory::Generic).await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
        assert!(!dir.join("s1.jsonl").exists());
    }

    #[tokio::test]
    async fn concurrent_appends_to_different_sessions_both_persist() {
        let dir = tmp_dir();
        let store = Arc::new(SessionStore::new(&dir));
        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    store.append_message("s1", Message::user(format!("a{i}")), OutputCategory::Generic).await.unwrap();
                }
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    store.append_message("s2", Message::user(format!("b{i}")), OutputCategory::Generic).await.unwrap();
                }
            })
        };
        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(store.get_or_create("s1").await.messages.len(), 20);
        assert_eq!(store.get_or_create("s2").await.messages.len(), 20);
    }
}
