//! Feed registry: feed code to report code and resolved table spec.
//!
//! Built once from the `[[feeds]]` configuration. Each entry either carries
//! an inline `table` or falls back to the built-in catalog; every resolved
//! spec is validated here so cycles never see an unsafe identifier.

use std::collections::HashMap;
use tracing::debug;

use hednova_core::{builtin_spec, builtin_title, TableSpec};

use crate::config::FeedConfig;
use crate::error::{IntegrationError, IntegrationResult};

/// A configured feed with its resolved table spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub code: String,
    pub report_code: String,
    pub title: String,
    pub detail: Option<String>,
    pub incremental: bool,
    pub spec: TableSpec,
}

/// Enabled feeds in configuration order.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: Vec<Feed>,
    index: HashMap<String, usize>,
}

impl FeedRegistry {
    /// Resolves and validates every enabled feed.
    pub fn from_config(configs: &[FeedConfig]) -> IntegrationResult<Self> {
        let mut registry = FeedRegistry::default();

        for config in configs.iter().filter(|c| c.enabled) {
            let feed = resolve(config)?;
            if registry.index.contains_key(&feed.code) {
                return Err(IntegrationError::InvalidConfig(format!(
                    "feed {} configured twice",
                    feed.code
                )));
            }

            debug!(
                code = %feed.code,
                report = %feed.report_code,
                table = %feed.spec.table,
                incremental = feed.incremental,
                "Registered feed"
            );
            registry.index.insert(feed.code.clone(), registry.feeds.len());
            registry.feeds.push(feed);
        }

        Ok(registry)
    }

    pub fn get(&self, code: &str) -> Option<&Feed> {
        self.index.get(code).map(|&i| &self.feeds[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn codes(&self) -> Vec<&str> {
        self.feeds.iter().map(|f| f.code.as_str()).collect()
    }
}

fn resolve(config: &FeedConfig) -> IntegrationResult<Feed> {
    let code = config.code.trim();
    if code.is_empty() {
        return Err(IntegrationError::InvalidConfig("feed code is required".into()));
    }

    let mut spec = match &config.table {
        Some(table) => table.clone(),
        None => builtin_spec(code).ok_or_else(|| IntegrationError::UnknownFeed(code.to_string()))?,
    };
    // Partial snapshots must never delete.
    if config.incremental {
        spec.prune_missing = false;
    }
    spec.validate()?;

    let report_code = config
        .report_code
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(code)
        .to_string();

    let title = config
        .title
        .clone()
        .or_else(|| builtin_title(code).map(str::to_string))
        .unwrap_or_else(|| code.to_string());

    Ok(Feed {
        code: code.to_string(),
        report_code,
        title,
        detail: config.detail.clone().filter(|d| !d.trim().is_empty()),
        incremental: config.incremental,
        spec,
    })
}
