// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pocket_bus::{Bus, InboundMessage, OutboundMessage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::job::{Job, JobPayload, Schedule, MIN_EVERY_MS};
use crate::store::JobStore;

struct Inner {
    jobs: Mutex<HashMap<String, Job>>,
    store: JobStore,
    bus: Arc<Bus>,
    tick_interval_ms: u64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Persistent store of named jobs plus the tick loop that fires them.
/// Cheap to clone (internally reference-counted), so a clone can be handed to
/// the spawned tick task.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Load existing jobs from `store_path` (an empty set if the file does
    /// not yet exist) and build a scheduler bound to `bus`.
    pub async fn new(
        store_path: impl Into<std::path::PathBuf>,
        bus: Arc<Bus>,
        tick_interval_ms: u64,
    ) -> anyhow::Result<Self> {
        let store = JobStore::new(store_path);
        let jobs = store.load().await?;
        Ok(Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(jobs),
                store,
                bus,
                tick_interval_ms,
                task: Mutex::new(None),
            }),
        })
    }

    /// Register a new job. `enabled` defaults to `true`; `delete_after_run`
    /// defaults to `true` for `at` schedules and `false` otherwise.
    pub async fn add_job(
        &self,
        schedule: Schedule,
        payload: JobPayload,
        name: impl Into<String>,
        enabled: Option<bool>,
        delete_after_run: Option<bool>,
    ) -> anyhow::Result<Job> {
        if let Schedule::Every { every_ms } = &schedule {
            if *every_ms < MIN_EVERY_MS {
                anyhow::bail!("every-schedule interval must be >= {MIN_EVERY_MS}ms, got {every_ms}ms");
            }
        }

        let now = Utc::now();
        let next_run_at = schedule.next_after(now)?;
        let delete_after_run =
            delete_after_run.unwrap_or_else(|| matches!(schedule, Schedule::At { .. }));

        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            schedule,
            payload,
            enabled: enabled.unwrap_or(true),
            delete_after_run,
            next_run_at,
            last_run_at: None,
            last_error: None,
            created_at: now,
        };

        let mut jobs = self.inner.jobs.lock().await;
        jobs.insert(job.id.clone(), job.clone());
        self.inner.store.save(&jobs).await?;
        Ok(job)
    }

    pub async fn remove_job(&self, id: &str) -> anyhow::Result<()> {
        let mut jobs = self.inner.jobs.lock().await;
        if jobs.remove(id).is_none() {
            anyhow::bail!("no such job: {id}");
        }
        self.inner.store.save(&jobs).await?;
        Ok(())
    }

    pub async fn enable_job(&self, id: &str, enabled: bool) -> anyhow::Result<()> {
        let mut jobs = self.inner.jobs.lock().await;
        let job = jobs.get_mut(id).ok_or_else(|| anyhow::anyhow!("no such job: {id}"))?;
        job.enabled = enabled;
        self.inner.store.save(&jobs).await?;
        Ok(())
    }

    pub async fn list_jobs(&self, include_disabled: bool) -> Vec<Job> {
        let jobs = self.inner.jobs.lock().await;
        jobs.values().filter(|j| include_disabled || j.enabled).cloned().collect()
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.inner.jobs.lock().await.get(id).cloned()
    }

    /// Launch the tick loop as a background task. A second call while
    /// already running is a no-op.
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            return;
        }
        let scheduler = self.clone();
        let interval_ms = self.inner.tick_interval_ms;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                scheduler.run_tick().await;
            }
        }));
    }

    /// Cancel the tick loop. Safe to call even if never started.
    pub async fn stop(&self) {
        let mut task = self.inner.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    /// One evaluation pass: fire every enabled job whose `next_run_at` has
    /// elapsed, then persist the updated state. Public so tests (and a
    /// one-shot CLI invocation) can drive a single pass deterministically
    /// instead of waiting on the interval.
    pub async fn run_tick(&self) {
        let now = Utc::now();
        let due: Vec<Job> = {
            let jobs = self.inner.jobs.lock().await;
            jobs.values()
                .filter(|j| j.enabled && j.next_run_at.map(|t| t <= now).unwrap_or(false))
                .cloned()
                .collect()
        };
        if due.is_empty() {
            return;
        }

        let mut jobs = self.inner.jobs.lock().await;
        for due_job in due {
            let Some(job) = jobs.get_mut(&due_job.id) else { continue };

            if let Err(e) = deliver(&self.inner.bus, &job.id, &job.payload).await {
                warn!(job_id = %job.id, error = %e, "scheduled job delivery failed");
                job.last_error = Some(e.to_string());
            } else {
                job.last_error = None;
            }
            job.last_run_at = Some(now);

            match job.schedule.next_after(now) {
                Ok(next) => job.next_run_at = next,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to compute next run; disabling job");
                    job.next_run_at = None;
                    job.last_error = Some(e.to_string());
                }
            }

            if job.next_run_at.is_none() && job.delete_after_run {
                jobs.remove(&due_job.id);
            }
        }

        if let Err(e) = self.inner.store.save(&jobs).await {
            error!(error = %e, "failed to persist scheduler state after tick");
        }
    }
}

async fn deliver(bus: &Bus, job_id: &str, payload: &JobPayload) -> anyhow::Result<()> {
    if payload.deliver {
        let channel = payload
            .channel
            .clone()
            .ok_or_else(|| anyhow::anyhow!("deliver=true job missing target channel"))?;
        let chat_id = payload
            .chat_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("deliver=true job missing target chat_id"))?;
        bus.publish_outbound(OutboundMessage {
            channel,
            chat_id,
            content: payload.content.clone(),
            media: vec![],
            reply_to: None,
            metadata: Default::default(),
        })
        .await?;
    } else {
        bus.publish_inbound(InboundMessage {
            channel: "cron".into(),
            sender_id: "cron".into(),
            chat_id: job_id.to_string(),
            content: payload.content.clone(),
            media: vec![],
            metadata: Default::default(),
        })
        .await?;
    }
    Ok(())
}
