// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pocket_bus::Bus;
use pocket_config::{AgentMode, ToolsConfig};
use pocket_memory::MemoryStore;
use pocket_scheduler::Scheduler;

use crate::tool::ToolContext;
use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors pocket_model::ToolSchema but keeps the tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
///
/// `context` uses copy-on-update: [`ToolRegistry::update_context`] rebinds a
/// whole new [`ToolContext`] atomically so every tool sees a consistent
/// snapshot, never a half-updated one (§5 shared-resource policy).
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<RwLock<Arc<ToolContext>>>,
}

// SAFETY: ToolRegistry is Sync because:
// - HashMap<String, Arc<dyn Tool>> is Sync (String is Sync, Arc<T: Send + Sync> is Sync)
// - Tools implement Send + Sync (required by the Tool trait)
// - No interior mutability exists after construction except `context`, which
//   is itself an RwLock<Arc<_>> and therefore Sync on its own
// - Parallel tool lookups are safe because `tools` is immutable after registration
unsafe impl Sync for ToolRegistry {}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            context: Arc::new(RwLock::new(Arc::new(ToolContext::default()))),
        }
    }

    /// A cloneable handle onto the shared context cell, for tools (`message`,
    /// `send_file`) that need to read ambient defaults at execution time
    /// rather than only at the registry's own `available()` filtering pass.
    pub fn context_handle(&self) -> Arc<RwLock<Arc<ToolContext>>> {
        self.context.clone()
    }

    /// Register every built-in tool with its default configuration.
    pub fn register_defaults(
        &mut self,
        cfg: &ToolsConfig,
        bus: Arc<Bus>,
        memory: Arc<dyn MemoryStore>,
        scheduler: Arc<Scheduler>,
    ) {
        crate::builtin::register_all(self, cfg, bus, memory, scheduler);
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Remove a tool by name. Returns `true` if it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Rebind the shared [`ToolContext`] atomically. All subsequent
    /// `available()`/`execute()` calls observe the new context; in-flight
    /// calls keep whatever snapshot they already captured.
    pub fn update_context(&self, delta: ToolContext) {
        let mut guard = self.context.write().expect("tool registry context lock poisoned");
        *guard = Arc::new(delta);
    }

    pub fn context(&self) -> Arc<ToolContext> {
        self.context.read().expect("tool registry context lock poisoned").clone()
    }

    /// Produce schemas for ALL registered tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Tool schemas for the tools the model should currently be told about:
    /// scoped to `mode`, and — when `filter_unavailable` is set — further
    /// restricted to tools whose `available()` check passes against the
    /// current context (e.g. hides `web_search` when no API key is set).
    pub fn definitions(&self, mode: AgentMode, filter_unavailable: bool) -> Vec<ToolSchema> {
        let ctx = self.context();
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .filter(|t| !filter_unavailable || t.available(&ctx))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(
                &call.id,
                format!("unknown tool: {}", call.name),
            ),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
