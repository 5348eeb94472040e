//! # Usernaut Connector
//!
//! The contract every backend adapter satisfies so the reconciliation
//! engine can drive it, plus the registry that builds adapters from
//! configuration.
//!
//! The contract is capability-based: [`UserOps`], [`TeamOps`], and
//! [`MembershipOps`] cover the operations every backend supports;
//! [`LdapSyncOps`] is an optional capability detected at the call site
//! (currently only git hosting). Adapters are cheap to construct - they
//! clone a pooled HTTP client - and the engine builds a fresh one per
//! reconcile so per-reconcile mode flips never leak across groups.
//!
//! ## Crate Organization
//!
//! - [`types`] - [`BackendType`] enum
//! - [`error`] - [`ConnectorError`] with transient/not-found classification
//! - [`traits`] - the capability traits
//! - [`config`] - connection settings and auth
//! - [`registry`] - factory registration and adapter construction
//! - [`http`] - shared reqwest client build and send-with-retry

pub mod config;
pub mod error;
pub mod http;
pub mod registry;
pub mod traits;
pub mod types;

pub use config::{AuthConfig, BackendSettings, ConnectionSettings, HttpClientConfig};
pub use error::{ConnectorError, ConnectorResult};
pub use registry::{BoxedConnector, ConnectorFactory, ConnectorRegistry};
pub use traits::{Connector, LdapSyncOps, MembershipOps, TeamOps, UserOps};
pub use types::BackendType;

// Re-export for adapter implementors.
pub use async_trait::async_trait;
