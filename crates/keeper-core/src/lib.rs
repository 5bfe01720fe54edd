//! keeper-core — shared vocabulary for the redundancy keeper.
//!
//! Holds the domain types read by the evaluator (`PredictRule`,
//! `MetricSeries`, `ScalingDecision`, `ServiceIdentity`), the error type
//! every collaborator reports through, the traits the scheduling engine is
//! written against, and the TOML configuration of the daemon.
//!
//! # Collaborators
//!
//! ```text
//! Scheduler ──► RuleStore        (list enabled rules once per tick)
//!     │
//!     └──► RedundancyEvaluator ──► MetricReader  (redundancy series)
//!                              └──► Fleet        (eligibility, count, expand, shrink)
//!
//! IdentityCache ──► IdentityResolver (network identity → service identity)
//! ```

pub mod config;
pub mod error;
pub mod rules;
pub mod traits;
pub mod types;

pub use config::KeeperConfig;
pub use error::{KeeperError, KeeperResult};
pub use rules::{FileRuleStore, MemoryRuleStore};
pub use traits::*;
pub use types::*;
