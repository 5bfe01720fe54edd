//! Scheduler — periodic fan-out of rule evaluations.
//!
//! Each tick lists enabled rules and spawns one evaluation per rule. A
//! semaphore bounds how many evaluations run at once; dispatch waits for a
//! free slot. Ticks do not wait for the previous tick's evaluations to
//! finish, so a slow rule only delays the rules queued behind it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Semaphore, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use keeper_core::RuleStore;
use keeper_core::config::SchedulerConfig;

use crate::evaluator::{Evaluation, RedundancyEvaluator};

pub struct Scheduler {
    rules: Arc<dyn RuleStore>,
    evaluator: Arc<RedundancyEvaluator>,
    limiter: Arc<Semaphore>,
    concurrency: usize,
    interval: Duration,
}

impl Scheduler {
    pub fn new(rules: Arc<dyn RuleStore>, evaluator: Arc<RedundancyEvaluator>, config: &SchedulerConfig) -> Self {
        let concurrency = config.rule_concurrency.max(1);
        Self {
            rules,
            evaluator,
            limiter: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            interval: config.run_interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of evaluations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.limiter.available_permits()
    }

    /// List enabled rules and dispatch one evaluation per rule.
    ///
    /// Returns once every rule has been handed a slot, not when the
    /// evaluations finish. Evaluation failures are logged inside the
    /// spawned task and never surface here.
    pub async fn schedule(&self) -> anyhow::Result<usize> {
        let rules = self
            .rules
            .list_enabled_rules()
            .await
            .context("list enabled rules failed")?;

        let mut dispatched = 0;
        for rule in rules.into_iter().filter(|r| r.is_enabled()) {
            let permit = self
                .limiter
                .clone()
                .acquire_owned()
                .await
                .context("rule limiter closed")?;
            let evaluator = self.evaluator.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let service = rule.service_name.as_str();
                let cluster = rule.cluster_name.as_str();
                match evaluator.evaluate(&rule).await {
                    Ok(Evaluation::Scaled(decision)) => {
                        info!(
                            service,
                            cluster,
                            direction = ?decision.direction,
                            count = decision.count,
                            "service scaled"
                        );
                    }
                    Ok(outcome) => debug!(service, cluster, ?outcome, "rule evaluated"),
                    Err(e) => error!(service, cluster, error = %format!("{e:#}"), "failed to schedule service"),
                }
            });
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Run ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// The first tick fires one interval after start. Evaluations already
    /// spawned keep running after this returns; use [`Scheduler::drain`]
    /// to wait for them.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            concurrency = self.concurrency,
            "scheduler started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if stopping(&shutdown) {
                        break;
                    }
                    continue;
                }
            }

            tokio::select! {
                result = self.schedule() => match result {
                    Ok(dispatched) => debug!(dispatched, "tick dispatched"),
                    Err(e) => warn!(error = %format!("{e:#}"), "rule listing failed, retrying next tick"),
                },
                _ = shutdown.changed() => {
                    if stopping(&shutdown) {
                        break;
                    }
                }
            }
        }

        info!(in_flight = self.in_flight(), "scheduler shutting down");
    }

    /// Wait until every spawned evaluation has released its slot.
    pub async fn drain(&self) {
        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if let Ok(permits) = self.limiter.acquire_many(all).await {
            drop(permits);
        }
    }
}

/// A closed channel counts as a shutdown request.
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
