// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Backing store for background jobs started by the `exec` tool and queried
//! by the `jobs` tool.
//!
//! Each job lives under `<root>/<job_id>/` as four plain files — `pid`,
//! `command`, `name`, `status` — plus an `output.log` capturing combined
//! stdout/stderr. No single JSON blob: each file is independently readable
//! (and independently corruptible without taking the rest down), matching
//! how a shell-first tool would lay this out on disk.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use tokio::process::Command;

/// Cap on how much of `output.log` is returned to the model in one call.
pub const JOB_OUTPUT_CAP_BYTES: usize = 100 * 1024;
/// Completed jobs are eligible for garbage collection once they are this old.
pub const JOB_RETENTION: Duration = Duration::from_secs(24 * 3600);
/// Hard cap on the number of completed jobs retained regardless of age.
pub const MAX_RETAINED_COMPLETED: usize = 20;

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub name: String,
    pub command: String,
    pub pid: Option<u32>,
    pub status: String,
}

pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Spawn `command` detached, capturing combined stdout/stderr to
    /// `output.log`, and return the new job's id.
    pub async fn spawn(&self, command: &str, working_dir: Option<&str>) -> std::io::Result<String> {
        self.gc().await;

        tokio::fs::create_dir_all(&self.root).await?;
        let job_id = new_job_id();
        let job_dir = self.job_dir(&job_id);
        tokio::fs::create_dir_all(&job_dir).await?;

        let name: String = command.chars().take(60).collect();
        tokio::fs::write(job_dir.join("command"), command).await?;
        tokio::fs::write(job_dir.join("name"), &name).await?;
        tokio::fs::write(job_dir.join("status"), "running").await?;

        let log_path = job_dir.join("output.log");
        let log_out = std::fs::File::create(&log_path)?;
        let log_err = log_out.try_clone()?;

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(log_out));
        cmd.stderr(Stdio::from(log_err));
        // Unlike the foreground exec path, background jobs must outlive this
        // function returning, so the child is not killed when dropped.
        cmd.kill_on_drop(false);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = working_dir {
            cmd.current_dir(wd);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        tokio::fs::write(job_dir.join("pid"), pid.to_string()).await?;

        let status_path = job_dir.join("status");
        tokio::spawn(async move {
            let outcome = child.wait().await;
            let text = match outcome {
                Ok(status) => format!("exited:{}", status.code().unwrap_or(-1)),
                Err(e) => format!("error:{e}"),
            };
            let _ = tokio::fs::write(&status_path, text).await;
        });

        Ok(job_id)
    }

    pub async fn list(&self) -> std::io::Result<Vec<JobSummary>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(job_id) = entry.file_name().to_str() {
                    if let Ok(summary) = self.status(job_id).await {
                        out.push(summary);
                    }
                }
            }
        }
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(out)
    }

    pub async fn status(&self, job_id: &str) -> std::io::Result<JobSummary> {
        let dir = self.job_dir(job_id);
        let command = read_trimmed(&dir.join("command")).await.unwrap_or_default();
        let name = read_trimmed(&dir.join("name")).await.unwrap_or_default();
        let status = read_trimmed(&dir.join("status")).await.unwrap_or_else(|| "unknown".into());
        let pid = read_trimmed(&dir.join("pid")).await.and_then(|s| s.parse().ok());
        if command.is_empty() && name.is_empty() && pid.is_none() {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such job: {job_id}")));
        }
        Ok(JobSummary { job_id: job_id.to_string(), name, command, pid, status })
    }

    /// Return the last `lines` lines of output (all of it if `lines` is `None`),
    /// capped at [`JOB_OUTPUT_CAP_BYTES`].
    pub async fn output(&self, job_id: &str, lines: Option<usize>) -> std::io::Result<String> {
        let path = self.job_dir(job_id).join("output.log");
        let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        let selected = match lines {
            Some(n) => {
                let all: Vec<&str> = content.lines().collect();
                let start = all.len().saturating_sub(n);
                all[start..].join("\n")
            }
            None => content,
        };
        if selected.len() > JOB_OUTPUT_CAP_BYTES {
            let start = selected.len() - JOB_OUTPUT_CAP_BYTES;
            Ok(format!("...[truncated, showing last {JOB_OUTPUT_CAP_BYTES} bytes]...\n{}", &selected[start..]))
        } else {
            Ok(selected)
        }
    }

    /// Send SIGTERM to a running job's process group and mark it killed.
    pub async fn kill(&self, job_id: &str) -> std::io::Result<()> {
        let summary = self.status(job_id).await?;
        if let Some(pid) = summary.pid {
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
        tokio::fs::write(self.job_dir(job_id).join("status"), "killed").await
    }

    /// Remove completed jobs older than [`JOB_RETENTION`], then trim to
    /// [`MAX_RETAINED_COMPLETED`] by oldest-first if still over the cap.
    pub async fn gc(&self) {
        let Ok(jobs) = self.list().await else { return };
        let now = SystemTime::now();
        let mut completed: Vec<(String, SystemTime)> = Vec::new();

        for job in &jobs {
            if job.status == "running" {
                continue;
            }
            let dir = self.job_dir(&job.job_id);
            let mtime = tokio::fs::metadata(&dir)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(now);
            if now.duration_since(mtime).unwrap_or_default() > JOB_RETENTION {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                continue;
            }
            completed.push((job.job_id.clone(), mtime));
        }

        if completed.len() > MAX_RETAINED_COMPLETED {
            completed.sort_by_key(|(_, mtime)| *mtime);
            let excess = completed.len() - MAX_RETAINED_COMPLETED;
            for (job_id, _) in completed.into_iter().take(excess) {
                let _ = tokio::fs::remove_dir_all(self.job_dir(&job_id)).await;
            }
        }
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok().map(|s| s.trim().to_string())
}

fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
