//! End-to-end scaling scenarios: rule store → scheduler → evaluator → fleet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use keeper_autoscale::{Evaluation, RedundancyEvaluator, Scheduler};
use keeper_core::config::{EvaluationConfig, SchedulerConfig};
use keeper_core::{
    ClusterSeries, Fleet, KeeperResult, MemoryRuleStore, MetricReader, MetricSeries, PredictRule, RuleStatus,
    ScalingDecision, SeriesQuery,
};

/// Per-cluster fixed redundancy samples.
#[derive(Default)]
struct Samples(Mutex<HashMap<String, Vec<f64>>>);

impl Samples {
    fn set(&self, cluster: &str, values: Vec<f64>) {
        self.0.lock().unwrap().insert(cluster.to_string(), values);
    }
}

#[async_trait]
impl MetricReader for Samples {
    async fn query_redundancy_series(&self, _: &SeriesQuery) -> KeeperResult<MetricSeries> {
        let clusters = self
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|(name, values)| ClusterSeries {
                cluster_name: name.clone(),
                values: values.clone(),
            })
            .collect();
        Ok(MetricSeries { clusters })
    }
}

/// Tracks instance counts and applies expand/shrink to them.
#[derive(Default)]
struct Cluster {
    counts: Mutex<HashMap<String, u32>>,
    busy: Mutex<Vec<String>>,
    ops: Mutex<Vec<String>>,
}

impl Cluster {
    fn with(counts: &[(&str, u32)]) -> Self {
        let cluster = Self::default();
        for (name, count) in counts {
            cluster.counts.lock().unwrap().insert(name.to_string(), *count);
        }
        cluster
    }

    fn count(&self, cluster: &str) -> u32 {
        self.counts.lock().unwrap().get(cluster).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fleet for Cluster {
    async fn is_schedulable(&self, _: &str, cluster: &str) -> KeeperResult<bool> {
        Ok(!self.busy.lock().unwrap().iter().any(|c| c == cluster))
    }

    async fn instance_count(&self, _: &str, cluster: &str) -> KeeperResult<u32> {
        Ok(self.count(cluster))
    }

    async fn expand(&self, _: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        *self.counts.lock().unwrap().entry(cluster.to_string()).or_default() += count;
        self.ops.lock().unwrap().push(format!("expand {cluster} {count}"));
        Ok(())
    }

    async fn shrink(&self, _: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        *self.counts.lock().unwrap().entry(cluster.to_string()).or_default() -= count;
        self.ops.lock().unwrap().push(format!("shrink {cluster} {count}"));
        Ok(())
    }
}

fn rule(cluster: &str) -> PredictRule {
    PredictRule {
        service_name: "search".to_string(),
        cluster_name: cluster.to_string(),
        metric_name: "qps".to_string(),
        benchmark_qps: 200,
        min_redundancy: 80,
        max_redundancy: 120,
        execute_ratio: 50,
        min_instance_count: 2,
        max_instance_count: 40,
        status: RuleStatus::Enabled,
    }
}

fn evaluator(samples: Arc<Samples>, fleet: Arc<Cluster>) -> Arc<RedundancyEvaluator> {
    Arc::new(RedundancyEvaluator::new(samples, fleet, EvaluationConfig::default()))
}

#[tokio::test]
async fn over_redundant_cluster_converges_toward_band() {
    let samples = Arc::new(Samples::default());
    samples.set("east", vec![1.5; 40]);
    let fleet = Arc::new(Cluster::with(&[("east", 10)]));
    let evaluator = evaluator(samples, fleet.clone());

    let outcome = evaluator.evaluate(&rule("east")).await.unwrap();
    assert_eq!(outcome, Evaluation::Scaled(ScalingDecision::shrink("east", 2)));
    assert_eq!(fleet.count("east"), 8);
}

#[tokio::test]
async fn expansion_stops_at_ceiling() {
    let samples = Arc::new(Samples::default());
    samples.set("west", vec![0.5; 40]);
    let fleet = Arc::new(Cluster::with(&[("west", 10)]));
    let evaluator = evaluator(samples, fleet.clone());
    let mut r = rule("west");
    r.max_instance_count = 11;

    evaluator.evaluate(&r).await.unwrap();
    assert_eq!(fleet.count("west"), 11);

    // At the ceiling the next round is a no-op rather than an API call.
    let outcome = evaluator.evaluate(&r).await.unwrap();
    assert_eq!(outcome, Evaluation::NoChange { redundancy: 0.5 });
    assert_eq!(fleet.ops.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn median_ignores_short_spikes() {
    let samples = Arc::new(Samples::default());
    // Mostly in band with a handful of extreme outliers.
    let mut values = vec![1.0; 35];
    values.extend([9.0, 9.0, 0.01, 0.01, 0.01]);
    samples.set("east", values);
    let fleet = Arc::new(Cluster::with(&[("east", 10)]));
    let evaluator = evaluator(samples, fleet.clone());

    let outcome = evaluator.evaluate(&rule("east")).await.unwrap();
    assert_eq!(outcome, Evaluation::WithinBand { redundancy: 1.0 });
    assert!(fleet.ops.lock().unwrap().is_empty());
}

#[tokio::test]
async fn busy_cluster_is_left_alone() {
    let samples = Arc::new(Samples::default());
    samples.set("east", vec![1.5; 40]);
    let fleet = Arc::new(Cluster::with(&[("east", 10)]));
    fleet.busy.lock().unwrap().push("east".into());
    let evaluator = evaluator(samples, fleet.clone());

    let outcome = evaluator.evaluate(&rule("east")).await.unwrap();
    assert_eq!(outcome, Evaluation::NotSchedulable);
    assert_eq!(fleet.count("east"), 10);
}

#[tokio::test(start_paused = true)]
async fn scheduler_ticks_apply_rule_edits() {
    let samples = Arc::new(Samples::default());
    samples.set("east", vec![1.5; 40]);
    samples.set("west", vec![0.5; 40]);
    let fleet = Arc::new(Cluster::with(&[("east", 10), ("west", 10)]));
    let store = MemoryRuleStore::new(vec![rule("east")]);
    let config = SchedulerConfig {
        run_interval: Duration::from_secs(30),
        rule_concurrency: 4,
    };
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(store.clone()),
        evaluator(samples, fleet.clone()),
        &config,
    ));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(fleet.count("east"), 8);
    assert_eq!(fleet.count("west"), 10);

    let mut disabled = rule("east");
    disabled.status = RuleStatus::Disabled;
    store.replace(vec![disabled, rule("west")]).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fleet.count("east"), 8);
    assert_eq!(fleet.count("west"), 15);

    tx.send(true).unwrap();
    handle.await.unwrap();
    scheduler.drain().await;
}
