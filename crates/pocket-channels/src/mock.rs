// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pocket_bus::{Bus, InboundMessage, OutboundMessage};

use crate::Channel;

/// An in-process channel for tests. `run` publishes a fixed, pre-supplied
/// script of `InboundMessage`s and records every `OutboundMessage` addressed
/// to its own tag so a test can assert on what the core sent back.
pub struct MockChannel {
    tag: String,
    script: Mutex<Vec<InboundMessage>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MockChannel {
    pub fn new(tag: impl Into<String>, script: Vec<InboundMessage>) -> Self {
        Self { tag: tag.into(), script: Mutex::new(script), sent: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Messages captured by the subscriber so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn run(&self, bus: Arc<Bus>) -> anyhow::Result<()> {
        let sent = self.sent.clone();
        let tag = self.tag.clone();
        bus.subscribe_outbound(move |m| {
            if m.channel == tag {
                sent.lock().unwrap().push(m.clone());
            }
        })
        .await;

        let messages = std::mem::take(&mut *self.script.lock().unwrap());
        for m in messages {
            bus.publish_inbound(m).await?;
        }
        Ok(())
    }
}
