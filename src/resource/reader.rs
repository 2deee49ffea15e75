//! Rate-limited, retrying access to listing calls
//!
//! [`Reader`] wraps a lister invocation in the robustness discipline every
//! outbound listing call shares: admission through the run-wide rate limiter
//! first, then a bounded number of attempts with a fixed sleep in between.
//! Only the call that initiates pagination is retried; draining the
//! remaining pages happens later, outside the retry scope, so a transient
//! mid-pagination failure can never produce a duplicated result set.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::lister::{FloatingIps, Images, ResourceLister, Servers, Shares, Users};
use super::pager::Pager;
use crate::error::CollectError;
use crate::openstack::ServiceClient;

/// Attempt budget per listing call.
pub const ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub const SLEEP_TIME: Duration = Duration::from_secs(1);

const ONE_CALL: NonZeroU32 = NonZeroU32::MIN;

/// Run-wide limiter shared by every producer; queues excess demand instead
/// of dropping it.
pub type ApiRateLimiter = DefaultDirectRateLimiter;

/// Build the run-wide rate limiter. Constructed once at pipeline start and
/// injected into every reader.
pub fn create_limiter(requests_per_second: u32) -> Result<ApiRateLimiter, CollectError> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
        CollectError::Config("rate limit must be at least 1 request per second".into())
    })?;
    Ok(RateLimiter::direct(Quota::per_second(rate)))
}

/// Lists resources of every kind from one service endpoint.
pub struct Reader {
    client: ServiceClient,
    limiter: Arc<ApiRateLimiter>,
}

impl Reader {
    pub fn new(client: ServiceClient, limiter: Arc<ApiRateLimiter>) -> Self {
        debug!(
            service = %client.service(),
            attempts = ATTEMPTS,
            sleep_time = ?SLEEP_TIME,
            "reader created with settings for unsuccessful calls and sleep time between the calls"
        );
        Self { client, limiter }
    }

    /// Perform a lister's listing call under the retry and rate-limit
    /// discipline.
    ///
    /// A failed limiter wait means the scheduling primitive itself is broken
    /// and aborts the run; it is never retried. Errors from the listing call
    /// are retried up to the attempt budget, and the last one is returned
    /// once the budget is exhausted.
    pub async fn read_resources(
        &self,
        lister: &dyn ResourceLister,
    ) -> Result<Pager, CollectError> {
        let kind = lister.kind();

        for attempt in 1..=ATTEMPTS {
            if let Err(err) = self.limiter.until_n_ready(ONE_CALL).await {
                return Err(CollectError::Fatal(format!(
                    "rate limiter cannot admit a {kind} listing call: {err}"
                )));
            }

            match lister.list(&self.client).await {
                Ok(pager) => return Ok(pager),
                Err(err) if attempt < ATTEMPTS => {
                    warn!(
                        kind = %kind,
                        attempt,
                        max_attempts = ATTEMPTS,
                        error = %err,
                        "listing attempt failed, retrying"
                    );
                    sleep(SLEEP_TIME).await;
                }
                Err(err) => {
                    return Err(CollectError::RetriesExhausted {
                        kind: kind.as_str(),
                        attempts: ATTEMPTS,
                        last_error: err,
                    });
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    /// Lists all servers.
    pub async fn list_all_servers(&self) -> Result<Pager, CollectError> {
        self.read_resources(&Servers).await
    }

    /// Lists all projects for the user dimension.
    pub async fn list_all_users(&self) -> Result<Pager, CollectError> {
        self.read_resources(&Users).await
    }

    /// Lists all images.
    pub async fn list_all_images(&self) -> Result<Pager, CollectError> {
        self.read_resources(&Images).await
    }

    /// Lists all shares.
    pub async fn list_all_shares(&self) -> Result<Pager, CollectError> {
        self.read_resources(&Shares).await
    }

    /// Lists all floating IPs owned by one tenant.
    pub async fn floating_ips(&self, tenant_id: &str) -> Result<Pager, CollectError> {
        self.read_resources(&FloatingIps {
            tenant_id: tenant_id.to_string(),
        })
        .await
    }
}
