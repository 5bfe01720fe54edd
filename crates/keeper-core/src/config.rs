//! keeper.toml configuration parser.
//!
//! Every section is optional. Durations are written as `"500ms"`, `"5s"`,
//! `"3m"` or a bare number of seconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{KeeperError, KeeperResult};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KeeperConfig {
    pub scheduler: SchedulerConfig,
    pub evaluation: EvaluationConfig,
    pub fleet: FleetConfig,
    pub metrics: MetricsConfig,
    pub rules: RulesConfig,
    pub identity_cache: IdentityCacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(deserialize_with = "de_duration")]
    pub run_interval: Duration,
    /// Evaluations allowed in flight at once, shared across ticks.
    pub rule_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(30),
            rule_concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    #[serde(deserialize_with = "de_duration")]
    pub lookback: Duration,
    /// Most recent window left out because its samples may still be in transit.
    #[serde(deserialize_with = "de_duration")]
    pub metric_send_delay: Duration,
    /// Subtracted from `lookback` to get the minimum sample count (one sample per second).
    #[serde(deserialize_with = "de_duration")]
    pub sample_margin: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub trim: Duration,
    /// Instances added or removed in one cycle, at most [`MAX_STEP_CAP`].
    pub max_step: u32,
    /// Log decisions without calling expand/shrink.
    pub dry_run: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(60),
            metric_send_delay: Duration::from_secs(5),
            sample_margin: Duration::from_secs(30),
            trim: Duration::from_secs(5),
            max_step: MAX_STEP_CAP,
            dry_run: false,
        }
    }
}

impl EvaluationConfig {
    /// Samples required before a cluster is considered at all.
    pub fn min_sample_count(&self) -> usize {
        self.lookback.saturating_sub(self.sample_margin).as_secs() as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub address: String,
    #[serde(deserialize_with = "de_duration")]
    pub timeout: Duration,
    pub token: Option<String>,
    /// Environment variable holding the token, consulted when `token` is unset.
    pub token_env: Option<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:9090".to_string(),
            timeout: Duration::from_secs(5),
            token: None,
            token_env: Some("KEEPER_FLEET_TOKEN".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub address: String,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8086".to_string(),
            path: "/api/v1/query/redundancy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub path: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "rules.toml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityCacheConfig {
    pub capacity: usize,
    #[serde(deserialize_with = "de_duration")]
    pub flush_interval: Duration,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            flush_interval: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl KeeperConfig {
    pub fn from_file(path: &Path) -> KeeperResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KeeperError::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse and validate a configuration document.
    pub fn parse(content: &str) -> KeeperResult<Self> {
        let config: KeeperConfig =
            toml::from_str(content).map_err(|e| KeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KeeperResult<()> {
        if self.scheduler.rule_concurrency == 0 {
            return Err(KeeperError::Config("scheduler.rule_concurrency must be at least 1".into()));
        }
        if self.scheduler.run_interval.is_zero() {
            return Err(KeeperError::Config("scheduler.run_interval must be positive".into()));
        }
        if self.evaluation.lookback <= self.evaluation.metric_send_delay {
            return Err(KeeperError::Config(
                "evaluation.lookback must exceed evaluation.metric_send_delay".into(),
            ));
        }
        if !(1..=MAX_STEP_CAP).contains(&self.evaluation.max_step) {
            return Err(KeeperError::Config(format!(
                "evaluation.max_step must be between 1 and {MAX_STEP_CAP}"
            )));
        }
        if self.identity_cache.capacity == 0 {
            return Err(KeeperError::Config("identity_cache.capacity must be at least 1".into()));
        }
        if self.fleet.address.is_empty() {
            return Err(KeeperError::Config("fleet.address must not be empty".into()));
        }
        if self.metrics.address.is_empty() {
            return Err(KeeperError::Config("metrics.address must not be empty".into()));
        }
        Ok(())
    }
}

/// Largest per-cycle step any configuration may ask for.
pub const MAX_STEP_CAP: u32 = 30;

/// Parse a duration string like "5s", "500ms", "3m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {text:?}"))),
    }
}
