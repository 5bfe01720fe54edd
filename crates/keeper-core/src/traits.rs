//! Seams between the scheduling engine and its external collaborators.
//!
//! Each trait is object-safe so the daemon can hold `Arc<dyn ...>` handles
//! and tests can substitute in-process fakes.

use async_trait::async_trait;

use crate::error::KeeperResult;
use crate::types::{MetricSeries, PredictRule, ServiceIdentity};

/// Source of scaling rules, read once per scheduler tick.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_enabled_rules(&self) -> KeeperResult<Vec<PredictRule>>;
}

/// Parameters of a redundancy series query.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    pub service_name: String,
    pub cluster_name: String,
    pub metric_name: String,
    pub benchmark_qps: f64,
    /// Window start, unix seconds.
    pub begin: i64,
    /// Window end, unix seconds.
    pub end: i64,
    /// Seconds trimmed from both ends of each series by the query layer.
    pub trim_seconds: u64,
}

/// Time-series backend producing redundancy samples.
#[async_trait]
pub trait MetricReader: Send + Sync {
    async fn query_redundancy_series(&self, query: &SeriesQuery) -> KeeperResult<MetricSeries>;
}

/// Fleet-orchestration operations the evaluator acts through.
#[async_trait]
pub trait Fleet: Send + Sync {
    /// `false` while another scaling operation is pending for the cluster.
    async fn is_schedulable(&self, service: &str, cluster: &str) -> KeeperResult<bool>;

    /// Running instances across all sub-clusters.
    async fn instance_count(&self, service: &str, cluster: &str) -> KeeperResult<u32>;

    async fn expand(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()>;

    async fn shrink(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()>;
}

/// Issues bearer tokens for outbound fleet requests. Refresh and caching
/// are the issuer's concern.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn token(&self) -> KeeperResult<String>;
}

/// Maps a raw network identity (usually an inner IP) to its service.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_identity(&self, identity: &str) -> KeeperResult<ServiceIdentity>;
}
