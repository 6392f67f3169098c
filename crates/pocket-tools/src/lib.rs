// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod events;
pub mod jobs;
pub mod policy;
pub mod registry;
pub mod sandbox;
pub mod tool;

pub use events::{ToolExecution, ToolOutcome};
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolContext, ToolOutput, ToolOutputPart};

pub use builtin::register_all;
pub use builtin::cron::CronTool;
pub use builtin::edit_file::EditFileTool;
pub use builtin::exec::ExecTool;
pub use builtin::jobs::JobsTool;
pub use builtin::list_dir::ListDirTool;
pub use builtin::memory::MemoryTool;
pub use builtin::message::MessageTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::send_file::SendFileTool;
pub use builtin::think::ThinkTool;
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write_file::WriteFileTool;
