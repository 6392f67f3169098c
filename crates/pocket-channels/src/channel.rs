// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use pocket_bus::Bus;

/// The contract a channel adapter (terminal REPL, Telegram bot, WhatsApp
/// bridge, ...) honors against the bus. The core never talks to a channel
/// directly — only through `InboundMessage`/`OutboundMessage` on the `Bus`.
///
/// A channel is mutual: it (a) publishes `InboundMessage`s tagged with its
/// own `tag()` as new input arrives, and (b) subscribes to `OutboundMessage`s
/// and renders/sends the ones addressed to it. Concrete adapters are external
/// collaborators and are not implemented here.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short, stable identifier used as `InboundMessage::channel` /
    /// `OutboundMessage::channel`, e.g. `"cli"`, `"telegram"`, `"whatsapp"`.
    fn tag(&self) -> &str;

    /// Run the channel until it is stopped or the bus shuts down. Implementors
    /// publish inbound traffic onto `bus` and subscribe to outbound traffic
    /// addressed to their own `tag()`.
    async fn run(&self, bus: Arc<Bus>) -> anyhow::Result<()>;

    /// Request a graceful stop. The core must not assume queued or in-flight
    /// messages survive a channel restart, so the default no-op is a valid
    /// implementation for channels with nothing to flush.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
