// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-process message bus connecting channel adapters, the agent loop, and
//! the scheduler: four bounded FIFO queues (inbound, outbound, tool events,
//! state changes) with best-effort pub/sub fan-out on top.

mod bus;
mod types;

pub use bus::{log_subscriber_failure, Bus, BusError, BusStats, StreamStats, DEFAULT_CAPACITY};
pub use types::{
    AgentState, InboundMessage, Media, MediaKind, OutboundMessage, StateChange, ToolExecutionEvent,
};
