// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A stdin/stdout [`Channel`] implementation — the one concrete adapter this
//! binary ships. Everything else (Telegram, WhatsApp, ...) is an external
//! collaborator per the `pocket-channels` contract.
use std::sync::Arc;

use async_trait::async_trait;
use pocket_bus::{Bus, InboundMessage};
use pocket_channels::Channel;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

/// Reads lines from stdin as inbound turns on a single fixed chat, and prints
/// outbound replies addressed to this channel's tag to stdout.
pub struct ReplChannel {
    tag: String,
    sender_id: String,
    chat_id: String,
    stop: Arc<Notify>,
}

impl ReplChannel {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            tag: "cli".into(),
            sender_id: sender_id.into(),
            chat_id: "repl".into(),
            stop: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Channel for ReplChannel {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn run(&self, bus: Arc<Bus>) -> anyhow::Result<()> {
        let tag = self.tag.clone();
        bus.subscribe_outbound(move |m| {
            if m.channel == tag {
                println!("{}", m.content);
            }
        })
        .await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let next = tokio::select! {
                line = lines.next_line() => line?,
                _ = self.stop.notified() => return Ok(()),
            };
            let Some(line) = next else {
                // EOF on stdin: nothing more to read, but keep the channel
                // alive so outbound replies already in flight still print.
                self.stop.notified().await;
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            bus.publish_inbound(InboundMessage {
                channel: self.tag.clone(),
                sender_id: self.sender_id.clone(),
                chat_id: self.chat_id.clone(),
                content: line,
                media: Vec::new(),
                metadata: serde_json::Map::new(),
            })
            .await?;
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stop.notify_waiters();
        Ok(())
    }
}
