//! OpenStack service clients
//!
//! A [`ProviderSession`] holds the authenticated session state shared by the
//! whole run: the pre-issued token and the endpoint catalog. Per-service
//! [`ServiceClient`]s are derived from it, one per logical API, and are safe
//! to share read-only across concurrent producers.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::http::HttpClient;
use crate::error::CollectError;

/// Logical OpenStack APIs the collector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Compute,
    Image,
    SharedFileSystem,
    Network,
    Identity,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Compute => "compute",
            Service::Image => "image",
            Service::SharedFileSystem => "sharedfilesystem",
            Service::Network => "network",
            Service::Identity => "identity",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint catalog, one base URL per logical API.
///
/// Versioned bases are expected, e.g. `https://glance.example:9292/v2` for
/// the image API or `https://keystone.example:5000/v3` for identity.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Endpoints {
    #[serde(default)]
    pub compute: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub share: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
}

impl Endpoints {
    fn for_service(&self, service: Service) -> Option<&str> {
        match service {
            Service::Compute => self.compute.as_deref(),
            Service::Image => self.image.as_deref(),
            Service::SharedFileSystem => self.share.as_deref(),
            Service::Network => self.network.as_deref(),
            Service::Identity => self.identity.as_deref(),
        }
    }
}

/// Authenticated session against one OpenStack deployment.
#[derive(Clone, Debug)]
pub struct ProviderSession {
    token: String,
    endpoints: Endpoints,
    http: HttpClient,
}

impl ProviderSession {
    /// Create a session from a pre-issued token and an endpoint catalog.
    ///
    /// An empty token means the pipeline was wired without authentication,
    /// which cannot produce usable accounting data, so it is rejected here
    /// rather than surfacing as a per-kind listing failure later.
    pub fn new(
        token: &str,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> std::result::Result<Self, CollectError> {
        if token.is_empty() {
            return Err(CollectError::Fatal("authentication token is empty".into()));
        }

        let http = HttpClient::new(timeout)
            .map_err(|err| CollectError::Fatal(format!("cannot build HTTP client: {err}")))?;

        Ok(Self {
            token: token.to_string(),
            endpoints,
            http,
        })
    }

    /// Derive a client for one logical API.
    ///
    /// A missing endpoint for a requested service is a wiring error, reported
    /// before any producer starts listing.
    pub fn service_client(
        &self,
        service: Service,
    ) -> std::result::Result<ServiceClient, CollectError> {
        let raw = self.endpoints.for_service(service).ok_or_else(|| {
            CollectError::Fatal(format!("no {service} endpoint configured"))
        })?;

        let endpoint = parse_endpoint(raw)
            .map_err(|err| CollectError::Fatal(format!("invalid {service} endpoint: {err}")))?;

        Ok(ServiceClient {
            service,
            endpoint,
            token: self.token.clone(),
            http: self.http.clone(),
        })
    }
}

/// Parse an endpoint base URL, normalizing to a trailing slash so that
/// relative listing paths append instead of replacing the last segment.
fn parse_endpoint(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).with_context(|| format!("cannot parse endpoint URL {raw:?}"))?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

/// Client for one logical OpenStack API.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    service: Service,
    endpoint: Url,
    token: String,
    http: HttpClient,
}

impl ServiceClient {
    pub fn service(&self) -> Service {
        self.service
    }

    /// Build a listing URL relative to the service endpoint.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .with_context(|| format!("cannot build {} URL for path {path:?}", self.service))
    }

    /// Build a listing URL with query parameters, e.g. tenant scoping.
    pub fn url_with_query(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    /// Resolve a pagination link against the service endpoint. Next links
    /// come back either absolute or as server-relative paths.
    pub fn resolve(&self, href: &str) -> Result<Url> {
        self.endpoint
            .join(href)
            .with_context(|| format!("cannot resolve {} link {href:?}", self.service))
    }

    /// Make a GET request against this service.
    pub async fn get(&self, url: &Url) -> Result<Value> {
        self.http.get(url.as_str(), &self.token).await
    }
}
