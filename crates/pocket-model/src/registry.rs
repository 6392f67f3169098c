// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider registry: resolves a `provider` config key to a constructed
//! [`ModelProvider`].
//!
//! Concrete vendor HTTP clients (OpenAI, Anthropic, ...) are external to this
//! crate; the registry only owns the `"mock"` factory out of the box. An
//! embedding application registers additional factories for the drivers it
//! ships before calling [`ProviderRegistry::build`].

use std::collections::HashMap;
use std::sync::Arc;

use pocket_config::ModelConfig;

use crate::{MockProvider, ModelProvider};

type Factory = Arc<dyn Fn(&ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> + Send + Sync>;

/// A registry of provider-construction factories, keyed by `ModelConfig::provider`.
pub struct ProviderRegistry {
    factories: HashMap<String, Factory>,
}

impl ProviderRegistry {
    /// An empty registry with no factories registered.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry pre-populated with the built-in `"mock"` driver.
    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        reg.register("mock", |_cfg| Ok(Box::new(MockProvider) as Box<dyn ModelProvider>));
        reg
    }

    /// Register a factory under `id`. Replaces any existing factory for that id.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Returns `true` if a factory is registered for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// All registered provider ids.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Build a [`ModelProvider`] from `cfg` by dispatching on `cfg.provider`.
    pub fn build(&self, cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
        let factory = self.factories.get(&cfg.provider).ok_or_else(|| {
            let known: Vec<&str> = self.ids();
            anyhow::anyhow!(
                "unknown model provider: {:?}\nKnown providers: {}",
                cfg.provider,
                known.join(", ")
            )
        })?;
        factory(cfg)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
