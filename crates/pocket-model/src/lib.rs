// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod registry;
pub mod sanitize;
mod types;
mod provider;
mod mock;

pub use catalog::{InputModality, ModelCatalogEntry};
pub use types::*;
pub use provider::{ModelProvider, ResponseStream};
pub use mock::{MockProvider, ScriptedMockProvider};
pub use registry::ProviderRegistry;

use pocket_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration using the default
/// registry (built-in `"mock"` driver only).
///
/// Applications that ship real vendor drivers should build their own
/// [`ProviderRegistry`], register their factories, and call
/// [`ProviderRegistry::build`] directly instead of this convenience function.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    ProviderRegistry::with_defaults().build(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_builds_mock_provider() {
        let cfg = ModelConfig { provider: "mock".into(), ..ModelConfig::default() };
        let provider = from_config(&cfg).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn from_config_rejects_unknown_provider() {
        let cfg = ModelConfig { provider: "not-a-real-provider".into(), ..ModelConfig::default() };
        assert!(from_config(&cfg).is_err());
    }
}
