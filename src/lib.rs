//! oscollect - concurrent resource collector for OpenStack accounting
//!
//! Enumerates servers, images, shares, floating IPs and identity projects
//! from an OpenStack deployment, filters them against a configured time
//! window and emits the survivors as a stream of records for a downstream
//! accounting pipeline.
//!
//! # Architecture
//!
//! - [`openstack`] - Authenticated session and per-service HTTP clients
//! - [`resource`] - Record model, lazy pagination, per-kind listers and the
//!   rate-limited retrying reader
//! - [`filter`] - Time-window resolution and filtering
//! - [`pipeline`] - Producer fan-out, completion barrier and consumer stages
//! - [`config`] - Config file, environment and CLI-override plumbing
//! - [`error`] - The fatal/recoverable/configuration error taxonomy

pub mod config;
pub mod error;
pub mod filter;
pub mod openstack;
pub mod pipeline;
pub mod resource;
