//! Explicit wiring of every long-lived component.
//!
//! Nothing is global: `keeperd` builds one `AppContext` from the loaded
//! configuration and hands its parts to the tasks that need them.

use std::sync::Arc;

use tracing::info;

use keeper_autoscale::{RedundancyEvaluator, Scheduler};
use keeper_core::{FileRuleStore, KeeperConfig};
use keeper_fleet::{FleetClient, HttpMetricReader, HttpTransport, IdentityCache};

pub struct AppContext {
    pub config: KeeperConfig,
    pub rules: Arc<FileRuleStore>,
    pub scheduler: Arc<Scheduler>,
    pub identities: IdentityCache,
}

impl AppContext {
    pub fn build(config: KeeperConfig) -> Self {
        let fleet = Arc::new(FleetClient::from_config(&config.fleet));
        info!(address = fleet.address(), timeout = ?config.fleet.timeout, "fleet client ready");

        // The metric service is unauthenticated; it shares only the timeout.
        let metrics_transport = Arc::new(HttpTransport::new(config.fleet.timeout));
        let metrics = Arc::new(HttpMetricReader::from_config(&config.metrics, metrics_transport));

        let rules = Arc::new(FileRuleStore::new(&config.rules.path));
        info!(path = %config.rules.path, "rule store ready");

        let evaluator = Arc::new(RedundancyEvaluator::new(
            metrics,
            fleet.clone(),
            config.evaluation.clone(),
        ));
        if config.evaluation.dry_run {
            info!("dry run enabled, scaling decisions will only be logged");
        }

        let scheduler = Arc::new(Scheduler::new(rules.clone(), evaluator, &config.scheduler));
        let identities = IdentityCache::from_config(fleet.clone(), &config.identity_cache);

        Self {
            config,
            rules,
            scheduler,
            identities,
        }
    }
}
