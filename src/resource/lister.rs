//! Listing capabilities, one per resource kind
//!
//! Each lister knows how to ask its API for a listing with default,
//! unfiltered options and how to turn a raw page into concrete records.
//! Robustness (rate limiting, retry, timeouts) lives entirely in
//! [`crate::resource::reader`]; a lister only knows how to ask.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::pager::{Page, Pager};
use super::{Resource, ResourceKind};
use crate::openstack::ServiceClient;

/// A listing capability for one resource kind.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Perform the listing call that initiates pagination and return the
    /// primed pager.
    async fn list(&self, client: &ServiceClient) -> Result<Pager>;

    /// Turn one raw page into concrete records.
    fn extract(&self, page: &Page) -> Result<Vec<Resource>>;
}

fn extract_page<T, F>(page: &Page, kind: ResourceKind, wrap: F) -> Result<Vec<Resource>>
where
    T: DeserializeOwned,
    F: Fn(T) -> Resource,
{
    page.items()
        .iter()
        .map(|item| {
            serde_json::from_value::<T>(item.clone())
                .map(&wrap)
                .with_context(|| format!("error extract {kind}"))
        })
        .collect()
}

/// Lists compute servers with their usage extension fields.
pub struct Servers;

#[async_trait]
impl ResourceLister for Servers {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Servers
    }

    async fn list(&self, client: &ServiceClient) -> Result<Pager> {
        let url = client.url("servers/detail")?;
        Pager::open(client, &url, "servers").await
    }

    fn extract(&self, page: &Page) -> Result<Vec<Resource>> {
        extract_page(page, self.kind(), Resource::Server)
    }
}

/// Lists identity projects, the accounting user dimension.
pub struct Users;

#[async_trait]
impl ResourceLister for Users {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Users
    }

    async fn list(&self, client: &ServiceClient) -> Result<Pager> {
        let url = client.url("projects")?;
        Pager::open(client, &url, "projects").await
    }

    fn extract(&self, page: &Page) -> Result<Vec<Resource>> {
        extract_page(page, self.kind(), Resource::Project)
    }
}

/// Lists image snapshots.
pub struct Images;

#[async_trait]
impl ResourceLister for Images {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Images
    }

    async fn list(&self, client: &ServiceClient) -> Result<Pager> {
        let url = client.url("images")?;
        Pager::open(client, &url, "images").await
    }

    fn extract(&self, page: &Page) -> Result<Vec<Resource>> {
        extract_page(page, self.kind(), Resource::Image)
    }
}

/// Lists shared file systems with detail.
pub struct Shares;

#[async_trait]
impl ResourceLister for Shares {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Shares
    }

    async fn list(&self, client: &ServiceClient) -> Result<Pager> {
        let url = client.url("shares/detail")?;
        Pager::open(client, &url, "shares").await
    }

    fn extract(&self, page: &Page) -> Result<Vec<Resource>> {
        extract_page(page, self.kind(), Resource::Share)
    }
}

/// Lists floating IPs scoped to one tenant.
pub struct FloatingIps {
    pub tenant_id: String,
}

#[async_trait]
impl ResourceLister for FloatingIps {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FloatingIps
    }

    async fn list(&self, client: &ServiceClient) -> Result<Pager> {
        let url = client.url_with_query("floatingips", &[("tenant_id", &self.tenant_id)])?;
        Pager::open(client, &url, "floatingips").await
    }

    fn extract(&self, page: &Page) -> Result<Vec<Resource>> {
        extract_page(page, self.kind(), Resource::FloatingIp)
    }
}
