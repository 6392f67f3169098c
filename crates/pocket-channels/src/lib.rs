// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The contract channel adapters (terminal REPL, Telegram bot, WhatsApp
//! bridge, ...) honor against the bus. Concrete adapters are external
//! collaborators and live outside this crate — only the [`Channel`] trait
//! and an in-process [`mock::MockChannel`] for tests are defined here.

mod channel;
pub mod mock;

pub use channel::Channel;
pub use mock::MockChannel;
