//! RedundancyEvaluator — one rule, one decision.
//!
//! Steps run strictly in order: query the series, check the cluster can be
//! scheduled, read the running count, decide, act. Any collaborator error
//! aborts the evaluation for this cycle; the next tick starts from scratch.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{debug, info};

use keeper_core::config::EvaluationConfig;
use keeper_core::{
    Fleet, MetricReader, PredictRule, ScaleDirection, ScalingDecision, SeriesQuery,
};

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Another scaling operation is pending for the cluster.
    NotSchedulable,
    /// The series had no entry for the rule's cluster.
    ClusterMissing,
    InsufficientSamples { have: usize, need: usize },
    WithinBand { redundancy: f64 },
    /// Out of band, but the damped and clamped delta came out as zero.
    NoChange { redundancy: f64 },
    Scaled(ScalingDecision),
    /// A decision was reached but not sent because dry-run is on.
    DryRun(ScalingDecision),
}

/// Median of `values`, sorting them in place.
///
/// Even-length input yields the lower of the two middle values; the pair
/// is never averaged.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[(values.len() - 1) / 2])
}

/// Whether `redundancy` lies strictly inside the rule's band. The bounds
/// themselves are out of band.
pub fn in_band(rule: &PredictRule, redundancy: f64) -> bool {
    let pct = (redundancy * 100.0) as i64;
    pct > i64::from(rule.min_redundancy) && pct < i64::from(rule.max_redundancy)
}

/// Compute the scaling decision for a cluster currently running `current`
/// instances at the given median redundancy.
pub fn decide(rule: &PredictRule, redundancy: f64, current: u32, max_step: u32) -> ScalingDecision {
    let cluster = rule.cluster_name.as_str();
    if in_band(rule, redundancy) {
        return ScalingDecision::none(cluster);
    }

    // Halve the integer percentage sum before converting.
    let mid = ((u64::from(rule.max_redundancy) + u64::from(rule.min_redundancy)) / 2) as f64 / 100.0;
    let current_i = i64::from(current);
    let expect = (mid / redundancy * f64::from(current)) as i64;
    let diff = expect.saturating_sub(current_i);
    let step = diff as f64 * f64::from(rule.execute_ratio) / 100.0;
    let max_step = i64::from(max_step);

    if diff > 0 {
        let headroom = i64::from(rule.max_instance_count) - current_i;
        let delta = (step.ceil() as i64).min(headroom).min(max_step);
        if delta <= 0 {
            return ScalingDecision::none(cluster);
        }
        ScalingDecision::expand(cluster, delta as u32)
    } else if diff < 0 {
        let headroom = current_i - i64::from(rule.min_instance_count);
        let delta = (step.abs().ceil() as i64).min(headroom).min(max_step);
        if delta <= 0 {
            return ScalingDecision::none(cluster);
        }
        ScalingDecision::shrink(cluster, delta as u32)
    } else {
        ScalingDecision::none(cluster)
    }
}

/// Evaluates rules against live metrics and acts through the fleet.
pub struct RedundancyEvaluator {
    metrics: Arc<dyn MetricReader>,
    fleet: Arc<dyn Fleet>,
    config: EvaluationConfig,
}

impl RedundancyEvaluator {
    pub fn new(metrics: Arc<dyn MetricReader>, fleet: Arc<dyn Fleet>, config: EvaluationConfig) -> Self {
        Self {
            metrics,
            fleet,
            config,
        }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate `rule` against the samples of the last lookback window.
    pub async fn evaluate(&self, rule: &PredictRule) -> anyhow::Result<Evaluation> {
        self.evaluate_at(rule, epoch_secs()).await
    }

    /// Evaluate `rule` as if the current time were `now` (unix seconds).
    pub async fn evaluate_at(&self, rule: &PredictRule, now: i64) -> anyhow::Result<Evaluation> {
        rule.validate().context("invalid predict rule")?;
        let service = rule.service_name.as_str();
        let cluster = rule.cluster_name.as_str();

        let query = SeriesQuery {
            service_name: rule.service_name.clone(),
            cluster_name: rule.cluster_name.clone(),
            metric_name: rule.metric_name.clone(),
            benchmark_qps: f64::from(rule.benchmark_qps),
            begin: now - self.config.lookback.as_secs() as i64,
            end: now - self.config.metric_send_delay.as_secs() as i64,
            trim_seconds: self.config.trim.as_secs(),
        };
        let series = self
            .metrics
            .query_redundancy_series(&query)
            .await
            .context("query redundancy series failed")?;

        let schedulable = self
            .fleet
            .is_schedulable(service, cluster)
            .await
            .context("query service schedule failed")?;
        if !schedulable {
            debug!(service, cluster, "scaling already in progress, skipping");
            return Ok(Evaluation::NotSchedulable);
        }

        let current = self
            .fleet
            .instance_count(service, cluster)
            .await
            .context("query service instance count failed")?;

        let Some(samples) = series.cluster(cluster) else {
            debug!(service, cluster, "no samples for cluster");
            return Ok(Evaluation::ClusterMissing);
        };

        let mut values: Vec<f64> = samples.values.iter().copied().filter(|v| v.is_finite()).collect();
        let need = self.config.min_sample_count();
        if values.len() < need || values.is_empty() {
            debug!(service, cluster, have = values.len(), need, "not enough samples");
            return Ok(Evaluation::InsufficientSamples {
                have: values.len(),
                need,
            });
        }
        let Some(redundancy) = median(&mut values) else {
            return Ok(Evaluation::InsufficientSamples { have: 0, need });
        };

        if in_band(rule, redundancy) {
            debug!(service, cluster, redundancy, "redundancy within band");
            return Ok(Evaluation::WithinBand { redundancy });
        }

        let decision = decide(rule, redundancy, current, self.config.max_step);
        if decision.is_noop() {
            debug!(service, cluster, redundancy, current, "computed delta is zero");
            return Ok(Evaluation::NoChange { redundancy });
        }

        if self.config.dry_run {
            info!(
                service,
                cluster,
                redundancy,
                current,
                direction = ?decision.direction,
                count = decision.count,
                "dry run: scaling decision not applied"
            );
            return Ok(Evaluation::DryRun(decision));
        }

        match decision.direction {
            ScaleDirection::Expand => self
                .fleet
                .expand(service, cluster, decision.count)
                .await
                .context("expand service failed")?,
            ScaleDirection::Shrink => self
                .fleet
                .shrink(service, cluster, decision.count)
                .await
                .context("shrink service failed")?,
            ScaleDirection::None => return Ok(Evaluation::NoChange { redundancy }),
        }

        debug!(
            service,
            cluster,
            redundancy,
            from = current,
            direction = ?decision.direction,
            count = decision.count,
            "scaling decision applied"
        );
        Ok(Evaluation::Scaled(decision))
    }
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
