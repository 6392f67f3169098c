// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use pocket_bus::Bus;
use pocket_config::ToolsConfig;
use pocket_memory::MemoryStore;
use pocket_scheduler::Scheduler;

pub mod cron;
pub mod edit_file;
pub mod exec;
pub mod jobs;
pub mod list_dir;
pub mod memory;
pub mod message;
pub mod read_file;
pub mod send_file;
pub mod think;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

use crate::registry::ToolRegistry;

/// Register every built-in tool with the registry, wiring filesystem tools to
/// `cfg.workspace_root`, `web_fetch`/`web_search` to `cfg.web`,
/// `message`/`send_file` to the shared bus and the registry's own context
/// cell (so they observe ambient channel/chat defaults set via
/// `update_context`), and `memory`/`cron` to the external memory collaborator
/// and the scheduler.
pub fn register_all(
    registry: &mut ToolRegistry,
    cfg: &ToolsConfig,
    bus: Arc<Bus>,
    memory_store: Arc<dyn MemoryStore>,
    scheduler: Arc<Scheduler>,
) {
    let workspace_root: Option<PathBuf> = cfg.workspace_root.as_ref().map(PathBuf::from);
    let context = registry.context_handle();

    registry.register(read_file::ReadFileTool::new(workspace_root.clone()));
    registry.register(write_file::WriteFileTool::new(workspace_root.clone()));
    registry.register(edit_file::EditFileTool::new(workspace_root.clone()));
    registry.register(list_dir::ListDirTool::new(workspace_root.clone()));
    registry.register(exec::ExecTool::new(workspace_root.clone()));
    registry.register(jobs::JobsTool::new(workspace_root));
    registry.register(think::ThinkTool);
    registry.register(message::MessageTool::new(bus.clone(), context.clone()));
    registry.register(send_file::SendFileTool::new(bus, context));
    registry.register(web_fetch::WebFetchTool::new(cfg.web.fetch_max_chars));
    registry.register(web_search::WebSearchTool { api_key: cfg.web.search.api_key.clone() });
    registry.register(memory::MemoryTool::new(memory_store));
    registry.register(cron::CronTool::new(scheduler));
}
