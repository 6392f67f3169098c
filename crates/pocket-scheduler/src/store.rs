// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::job::Job;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Single JSON document mapping job id to its serialized `Job`, rewritten
/// atomically (write-temp-and-rename) on every mutation.
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<HashMap<String, Job>, JobStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, jobs: &HashMap<String, Job>) -> Result<(), JobStoreError> {
        let body = serde_json::to_string_pretty(jobs)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.path, body.as_bytes()).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
    }
    tokio::fs::rename(&tmp_path, path).await
}
