//! OpenStack API access layer
//!
//! Thin session and HTTP plumbing shared by every producer:
//!
//! - [`client`] - Authenticated session and per-service clients
//! - [`http`] - reqwest wrapper with per-call timeout and sanitized logging
//!
//! Token issuance itself happens outside this tool; the session consumes a
//! pre-issued token from configuration or `OS_TOKEN`.

pub mod client;
pub mod http;

pub use client::{Endpoints, ProviderSession, Service, ServiceClient};
