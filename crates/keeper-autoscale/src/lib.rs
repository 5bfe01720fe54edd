//! keeper-autoscale — keeps service clusters inside their redundancy band.
//!
//! The [`Scheduler`] lists enabled rules on every tick and hands each one
//! to the [`RedundancyEvaluator`] under a shared concurrency limit. The
//! evaluator reads the cluster's redundancy samples, takes their median,
//! and asks the fleet to expand or shrink when the median leaves the band.
//!
//! # Scaling Algorithm
//!
//! ```text
//! redundancy = median(samples)              // lower-middle for even counts
//! pct        = trunc(redundancy * 100)
//!
//! if min_redundancy < pct < max_redundancy:
//!     no action
//!
//! mid    = ((max_redundancy + min_redundancy) / 2) / 100   // integer halving first
//! expect = trunc(mid / redundancy * current)
//! diff   = expect - current
//!
//! diff > 0: delta = ceil(diff * execute_ratio / 100)
//!           Expand(min(delta, max_instances - current, max_step))
//! diff < 0: delta = ceil(|diff| * execute_ratio / 100)
//!           Shrink(min(delta, current - min_instances, max_step))
//! ```
//!
//! A rule is skipped without error when the cluster is already being
//! scaled, when too few samples exist, or when the damped delta is zero.

pub mod evaluator;
pub mod scheduler;

pub use evaluator::{Evaluation, RedundancyEvaluator, decide, in_band, median};
pub use scheduler::Scheduler;
