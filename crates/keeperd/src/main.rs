//! keeperd — the redundancy keeper daemon.
//!
//! Runs the scaling control loop against the orchestration API:
//! - Rule store (TOML file, re-read every tick)
//! - Redundancy evaluator + bounded-concurrency scheduler
//! - Identity cache with periodic flush
//!
//! # Usage
//!
//! ```text
//! keeperd run --config /etc/keeper/keeper.toml
//! keeperd resolve --config keeper.toml 10.0.3.17 10.0.3.18
//! keeperd check --config keeper.toml
//! ```

mod context;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keeper_core::config::LogFormat;
use keeper_core::KeeperConfig;

use crate::context::AppContext;

const DEFAULT_FILTER: &str = "info,keeperd=debug,keeper=debug";

#[derive(Parser, Debug)]
#[command(name = "keeperd", about = "Redundancy keeper daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scaling loop until interrupted.
    Run {
        /// Path to the keeper configuration file.
        #[arg(long, short, default_value = "keeper.toml")]
        config: PathBuf,
    },
    /// Resolve network identities to service identities and print them.
    Resolve {
        #[arg(long, short, default_value = "keeper.toml")]
        config: PathBuf,

        /// Identities to resolve (e.g. inner IPs).
        #[arg(required = true)]
        identities: Vec<String>,
    },
    /// Validate the configuration and every rule in the rule file.
    Check {
        #[arg(long, short, default_value = "keeper.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = load(&config)?;
            init_tracing(config.logging.format);
            run(config).await
        }
        Command::Resolve { config, identities } => {
            let config = load(&config)?;
            init_tracing(config.logging.format);
            resolve(config, &identities).await
        }
        Command::Check { config } => {
            let config = load(&config)?;
            init_tracing(config.logging.format);
            check(&AppContext::build(config)).await
        }
    }
}

fn load(path: &Path) -> anyhow::Result<KeeperConfig> {
    KeeperConfig::from_file(path).with_context(|| format!("load config {}", path.display()))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: KeeperConfig) -> anyhow::Result<()> {
    info!("keeper daemon starting");
    let ctx = AppContext::build(config);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let scheduler_handle = tokio::spawn({
        let scheduler = ctx.scheduler.clone();
        let shutdown = shutdown_rx.clone();
        async move { scheduler.run(shutdown).await }
    });

    let flusher_handle = tokio::spawn({
        let identities = ctx.identities.clone();
        let shutdown = shutdown_rx.clone();
        async move { identities.run_flusher(shutdown).await }
    });

    tokio::signal::ctrl_c().await.context("install ctrl-c handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Wait for background tasks.
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    if let Err(e) = flusher_handle.await {
        warn!(error = %e, "identity flusher ended abnormally");
    }

    info!(in_flight = ctx.scheduler.in_flight(), "draining in-flight evaluations");
    ctx.scheduler.drain().await;

    info!("keeper daemon stopped");
    Ok(())
}

async fn resolve(config: KeeperConfig, identities: &[String]) -> anyhow::Result<()> {
    let ctx = AppContext::build(config);
    let mut failed = 0;
    for identity in identities {
        match ctx.identities.resolve(identity).await {
            Ok(service) => println!(
                "{identity} {} {}",
                service.service_name, service.service_cluster_name
            ),
            Err(e) => {
                warn!(identity = %identity, error = %e, "identity resolution failed");
                failed += 1;
            }
        }
    }
    let stats = ctx.identities.stats();
    debug!(hits = stats.hits, misses = stats.misses, resolutions = stats.resolutions, "identity cache stats");
    if failed > 0 {
        anyhow::bail!("{failed} of {} identities could not be resolved", identities.len());
    }
    Ok(())
}

async fn check(ctx: &AppContext) -> anyhow::Result<()> {
    let rules = ctx
        .rules
        .list_all_rules()
        .await
        .with_context(|| format!("load rules {}", ctx.config.rules.path))?;

    let mut invalid = 0;
    for rule in &rules {
        let verdict = match rule.validate() {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                invalid += 1;
                e.to_string()
            }
        };
        println!(
            "{} {} {:?} band={}..{} instances={}..{} ratio={} {}",
            rule.service_name,
            rule.cluster_name,
            rule.status,
            rule.min_redundancy,
            rule.max_redundancy,
            rule.min_instance_count,
            rule.max_instance_count,
            rule.execute_ratio,
            verdict
        );
    }
    info!(total = rules.len(), invalid, "rules checked");

    if invalid > 0 {
        anyhow::bail!("{invalid} of {} rules are invalid", rules.len());
    }
    Ok(())
}
