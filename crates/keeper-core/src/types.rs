//! Domain types for the redundancy keeper.
//!
//! Rules are owned by an external store and only ever read here. Metric
//! series and scaling decisions are produced per evaluation and dropped
//! once acted upon.

use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, KeeperResult};

// ── Rules ─────────────────────────────────────────────────────────

/// Whether a rule takes part in evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

/// Redundancy band and scaling bounds for one service cluster.
///
/// Percentages (`min_redundancy`, `max_redundancy`, `execute_ratio`) are
/// integers; `120` means 1.2x the benchmark throughput in spare capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictRule {
    pub service_name: String,
    pub cluster_name: String,
    pub metric_name: String,
    /// Throughput one instance is expected to sustain.
    pub benchmark_qps: u32,
    pub min_redundancy: u32,
    pub max_redundancy: u32,
    /// Share (0–100) of the computed correction applied in one cycle.
    pub execute_ratio: u32,
    pub min_instance_count: u32,
    pub max_instance_count: u32,
    #[serde(default)]
    pub status: RuleStatus,
}

impl PredictRule {
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }

    /// Check the invariants the evaluator relies on.
    pub fn validate(&self) -> KeeperResult<()> {
        if self.service_name.is_empty() {
            return Err(KeeperError::Validation("service name must not be empty".into()));
        }
        if self.cluster_name.is_empty() {
            return Err(KeeperError::Validation("cluster name must not be empty".into()));
        }
        if self.metric_name.is_empty() {
            return Err(KeeperError::Validation("metric name must not be empty".into()));
        }
        if self.benchmark_qps == 0 {
            return Err(KeeperError::Validation("benchmark qps must be positive".into()));
        }
        if self.min_redundancy > self.max_redundancy {
            return Err(KeeperError::Validation(format!(
                "min redundancy {} exceeds max redundancy {}",
                self.min_redundancy, self.max_redundancy
            )));
        }
        if self.min_instance_count > self.max_instance_count {
            return Err(KeeperError::Validation(format!(
                "min instance count {} exceeds max instance count {}",
                self.min_instance_count, self.max_instance_count
            )));
        }
        if self.execute_ratio > 100 {
            return Err(KeeperError::Validation(format!(
                "execute ratio {} is outside 0-100",
                self.execute_ratio
            )));
        }
        Ok(())
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// Redundancy samples for one cluster over the lookback window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterSeries {
    pub cluster_name: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

/// Per-cluster sample collections returned by the metric reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricSeries {
    #[serde(default)]
    pub clusters: Vec<ClusterSeries>,
}

impl MetricSeries {
    /// Samples for the named cluster, if the reader returned any.
    pub fn cluster(&self, name: &str) -> Option<&ClusterSeries> {
        self.clusters.iter().find(|c| c.cluster_name == name)
    }
}

// ── Decisions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Expand,
    Shrink,
    None,
}

/// What one evaluation decided for a cluster. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub cluster: String,
    pub direction: ScaleDirection,
    /// Instances to add or remove; always positive unless `direction` is `None`.
    pub count: u32,
}

impl ScalingDecision {
    pub fn none(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            direction: ScaleDirection::None,
            count: 0,
        }
    }

    pub fn expand(cluster: &str, count: u32) -> Self {
        Self {
            cluster: cluster.to_string(),
            direction: ScaleDirection::Expand,
            count,
        }
    }

    pub fn shrink(cluster: &str, count: u32) -> Self {
        Self {
            cluster: cluster.to_string(),
            direction: ScaleDirection::Shrink,
            count,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.direction == ScaleDirection::None
    }
}

// ── Identity ──────────────────────────────────────────────────────

/// Service a network identity belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServiceIdentity {
    #[serde(default)]
    pub service_name: String,
    #[serde(default, alias = "cluster_name")]
    pub service_cluster_name: String,
}
