//! Rule stores.
//!
//! `FileRuleStore` re-reads a TOML file on every listing so edits apply on
//! the next tick without a restart. `MemoryRuleStore` backs tests and
//! embedders that manage rules themselves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{KeeperError, KeeperResult};
use crate::traits::RuleStore;
use crate::types::PredictRule;

#[derive(Debug, Deserialize, Default)]
struct RulesDocument {
    #[serde(default)]
    rules: Vec<PredictRule>,
}

/// Parse a rules document into its `[[rules]]` entries (all statuses).
pub fn parse_rules(content: &str) -> KeeperResult<Vec<PredictRule>> {
    let doc: RulesDocument =
        toml::from_str(content).map_err(|e| KeeperError::Store(e.to_string()))?;
    Ok(doc.rules)
}

/// Rules kept in a TOML file of `[[rules]]` tables.
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every rule in the file regardless of status.
    pub async fn list_all_rules(&self) -> KeeperResult<Vec<PredictRule>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| KeeperError::Store(format!("read {}: {e}", self.path.display())))?;
        parse_rules(&content)
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn list_enabled_rules(&self) -> KeeperResult<Vec<PredictRule>> {
        let rules = self.list_all_rules().await?;
        let total = rules.len();
        let enabled: Vec<_> = rules.into_iter().filter(PredictRule::is_enabled).collect();
        debug!(path = ?self.path, total, enabled = enabled.len(), "rules loaded");
        Ok(enabled)
    }
}

/// In-memory rule list shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    rules: Arc<RwLock<Vec<PredictRule>>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<PredictRule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Replace the stored rules.
    pub async fn replace(&self, rules: Vec<PredictRule>) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_enabled_rules(&self) -> KeeperResult<Vec<PredictRule>> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|r| r.is_enabled()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleStatus;

    const DOC: &str = r#"
[[rules]]
service_name = "checkout"
cluster_name = "checkout-a"
metric_name = "qps"
benchmark_qps = 100
min_redundancy = 80
max_redundancy = 120
execute_ratio = 50
min_instance_count = 2
max_instance_count = 40

[[rules]]
service_name = "search"
cluster_name = "search-b"
metric_name = "qps"
benchmark_qps = 250
min_redundancy = 90
max_redundancy = 150
execute_ratio = 100
min_instance_count = 1
max_instance_count = 10
status = "disabled"
"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("keeper-rules-{}-{name}.toml", std::process::id()))
    }

    #[test]
    fn parse_rules_keeps_all_statuses() {
        let rules = parse_rules(DOC).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].status, RuleStatus::Disabled);
    }

    #[test]
    fn parse_rules_reports_store_error() {
        let err = parse_rules("[[rules]]\nservice_name = 3\n").unwrap_err();
        assert!(matches!(err, KeeperError::Store(_)));
    }

    #[tokio::test]
    async fn file_store_lists_enabled_only() {
        let path = temp_path("enabled");
        std::fs::write(&path, DOC).unwrap();

        let store = FileRuleStore::new(&path);
        let rules = store.list_enabled_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].service_name, "checkout");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn file_store_missing_file_is_store_error() {
        let store = FileRuleStore::new(temp_path("missing"));
        let err = store.list_enabled_rules().await.unwrap_err();
        assert!(matches!(err, KeeperError::Store(_)));
    }

    #[tokio::test]
    async fn memory_store_filters_and_replaces() {
        let mut rules = parse_rules(DOC).unwrap();
        let store = MemoryRuleStore::new(rules.clone());
        assert_eq!(store.list_enabled_rules().await.unwrap().len(), 1);

        rules[1].status = RuleStatus::Enabled;
        store.replace(rules).await;
        assert_eq!(store.list_enabled_rules().await.unwrap().len(), 2);
    }
}
