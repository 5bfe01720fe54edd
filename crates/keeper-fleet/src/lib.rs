//! keeper-fleet — typed access to the fleet-orchestration API.
//!
//! Every outbound request flows through a [`Transport`]. The base
//! [`HttpTransport`] owns the connection pool and the per-request timeout;
//! [`Authenticated`] decorates any transport with a bearer token fetched
//! from a [`keeper_core::TokenIssuer`] on each call.
//!
//! ```text
//! FleetClient / HttpMetricReader
//!   └── Authenticated<HttpTransport>
//!         ├── TokenIssuer::token()  → Authorization header
//!         └── hyper legacy client   → 5s timeout, no retry
//! ```
//!
//! Responses use the `{code, data, msg}` envelope; any `code` other than
//! 200 is surfaced as [`keeper_core::KeeperError::Api`].
//!
//! [`IdentityCache`] sits in front of the identity resolution endpoint and
//! deduplicates concurrent lookups for the same identity.

pub mod client;
pub mod envelope;
pub mod identity;
pub mod metrics;
pub mod query;
pub mod transport;

pub use client::FleetClient;
pub use identity::{CacheStats, IdentityCache};
pub use metrics::HttpMetricReader;
pub use transport::{Authenticated, HttpTransport, StaticTokenIssuer, Transport};
