//! The collection pipeline
//!
//! Orchestrates producers and consumers around a shared bounded channel.
//! One producer task runs per sub-kind (servers, images, shares, projects,
//! floating IPs); each performs the rate-limited retrying fetch, drains its
//! pager and writes every record onto the shared `read` channel. Downstream,
//! a filter stage and an enrichment stage consume concurrently with
//! production and forward accepted records to the caller's sink.
//!
//! Failure isolation is the core invariant: a producer that cannot list its
//! kind logs the error and contributes nothing, without blocking siblings or
//! the completion barrier. Only a broken pipeline primitive aborts the run.

pub mod barrier;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::CollectError;
use crate::filter::{Filter, TimeWindow};
use crate::openstack::{ProviderSession, Service};
use crate::resource::lister::{Images, ResourceLister, Servers, Shares, Users};
use crate::resource::reader::{ApiRateLimiter, Reader};
use crate::resource::{Resource, ResourceKind};
use barrier::{CompletionBarrier, CompletionGuard};

/// Outcome counters for one collection run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    /// Records written to the shared channel by producers.
    pub produced: usize,
    /// Records accepted by the time-window filter.
    pub accepted: usize,
    /// Records forwarded to the caller's sink.
    pub emitted: usize,
    /// Producers that contributed partial results or none at all.
    pub degraded: usize,
}

/// Orchestrates one collection run.
pub struct CollectionPipeline {
    session: ProviderSession,
    limiter: Arc<ApiRateLimiter>,
    window: TimeWindow,
    channel_capacity: usize,
}

impl CollectionPipeline {
    pub fn new(
        session: ProviderSession,
        limiter: Arc<ApiRateLimiter>,
        window: TimeWindow,
        channel_capacity: usize,
    ) -> Self {
        Self {
            session,
            limiter,
            window,
            channel_capacity,
        }
    }

    /// Run the pipeline, delivering accepted records to `sink`.
    ///
    /// The sink closes once collection is finished, so a consumer can treat
    /// "channel empty and closed" as "collection done". Recoverable per-kind
    /// failures are reported through [`RunReport::degraded`]; fatal
    /// conditions abort the run and surface as the error.
    pub async fn run(&self, sink: mpsc::Sender<Resource>) -> Result<RunReport, CollectError> {
        // Every service client is derived up front so that a misconfigured
        // endpoint stops the run before the first listing call.
        let compute = self.session.service_client(Service::Compute)?;
        let image = self.session.service_client(Service::Image)?;
        let share = self.session.service_client(Service::SharedFileSystem)?;
        let network = self.session.service_client(Service::Network)?;
        let identity = self.session.service_client(Service::Identity)?;

        let (read_tx, mut read_rx) = mpsc::channel::<Resource>(self.channel_capacity);
        let (filtered_tx, mut filtered_rx) = mpsc::channel::<Resource>(self.channel_capacity);

        // five producers: servers, images, shares, projects, floating IPs
        let mut producers: JoinSet<ProducerOutcome> = JoinSet::new();
        let barrier = CompletionBarrier::new(5);

        let limiter = &self.limiter;
        let mut spawn_listed = |client, lister: Box<dyn ResourceLister>| {
            let guard = CompletionGuard::new(barrier.clone());
            let reader = Reader::new(client, limiter.clone());
            let read = read_tx.clone();
            producers.spawn(async move {
                let _done = guard;
                produce(reader, lister, read).await
            });
        };

        spawn_listed(compute, Box::new(Servers));
        spawn_listed(image, Box::new(Images));
        spawn_listed(share, Box::new(Shares));
        spawn_listed(identity.clone(), Box::new(Users));

        {
            let guard = CompletionGuard::new(barrier.clone());
            let identity_reader = Reader::new(identity, limiter.clone());
            let network_reader = Reader::new(network, limiter.clone());
            let read = read_tx.clone();
            producers.spawn(async move {
                let _done = guard;
                produce_floating_ips(identity_reader, network_reader, read).await
            });
        }

        // The channel is closed for writing here and nowhere else, gated on
        // the barrier reaching zero.
        let closer = tokio::spawn({
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                drop(read_tx);
            }
        });

        let filter = Filter::new(self.window);
        let filter_stage = tokio::spawn(async move {
            let mut accepted = 0usize;
            while let Some(resource) = read_rx.recv().await {
                if filter.filtering(Some(resource), &filtered_tx).await {
                    accepted += 1;
                }
            }
            accepted
        });

        let enrich_stage = tokio::spawn(async move {
            let mut emitted = 0usize;
            while let Some(resource) = filtered_rx.recv().await {
                if retrieve_info(Some(resource), &sink).await {
                    emitted += 1;
                }
            }
            emitted
        });

        let mut produced = 0usize;
        let mut degraded = 0usize;
        while let Some(joined) = producers.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Some(fatal) = outcome.fatal {
                        error!(
                            kind = %outcome.kind,
                            error = %fatal,
                            "fatal producer failure, aborting collection"
                        );
                        producers.abort_all();
                        closer.abort();
                        filter_stage.abort();
                        enrich_stage.abort();
                        return Err(fatal);
                    }
                    produced += outcome.produced;
                    if outcome.degraded {
                        warn!(
                            kind = %outcome.kind,
                            produced = outcome.produced,
                            "producer contributed partial or no resources"
                        );
                        degraded += 1;
                    }
                }
                Err(err) => {
                    error!(error = %err, "producer task failed");
                    degraded += 1;
                }
            }
        }

        closer
            .await
            .map_err(|err| CollectError::Fatal(format!("channel closer failed: {err}")))?;
        let accepted = filter_stage
            .await
            .map_err(|err| CollectError::Fatal(format!("filter stage failed: {err}")))?;
        let emitted = enrich_stage
            .await
            .map_err(|err| CollectError::Fatal(format!("enrichment stage failed: {err}")))?;

        info!(produced, accepted, emitted, degraded, "collection pipeline finished");

        Ok(RunReport {
            produced,
            accepted,
            emitted,
            degraded,
        })
    }
}

struct ProducerOutcome {
    kind: ResourceKind,
    produced: usize,
    degraded: bool,
    fatal: Option<CollectError>,
}

impl ProducerOutcome {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            produced: 0,
            degraded: false,
            fatal: None,
        }
    }
}

/// One producer: fetch, drain, write to the shared channel.
async fn produce(
    reader: Reader,
    lister: Box<dyn ResourceLister>,
    read: mpsc::Sender<Resource>,
) -> ProducerOutcome {
    let kind = lister.kind();
    let mut outcome = ProducerOutcome::new(kind);

    let pager = match reader.read_resources(lister.as_ref()).await {
        Ok(pager) => pager,
        Err(err) if err.is_fatal() => {
            outcome.fatal = Some(err);
            return outcome;
        }
        Err(err) => {
            error!(kind = %kind, error = %err, "error list resources");
            outcome.degraded = true;
            return outcome;
        }
    };

    let (sent, degraded) = drain(kind, pager, lister.as_ref(), &read).await;
    outcome.produced = sent;
    outcome.degraded = degraded;
    outcome
}

/// Floating IPs are listed per tenant, so this producer first collects the
/// project IDs from identity and then fetches each tenant's addresses. A
/// failing tenant degrades the producer without stopping the remaining
/// tenants.
async fn produce_floating_ips(
    identity: Reader,
    network: Reader,
    read: mpsc::Sender<Resource>,
) -> ProducerOutcome {
    let mut outcome = ProducerOutcome::new(ResourceKind::FloatingIps);

    let users = Users;
    let mut pager = match identity.read_resources(&users).await {
        Ok(pager) => pager,
        Err(err) if err.is_fatal() => {
            outcome.fatal = Some(err);
            return outcome;
        }
        Err(err) => {
            error!(kind = %outcome.kind, error = %err, "error list projects for tenant scoping");
            outcome.degraded = true;
            return outcome;
        }
    };

    let mut tenant_ids = Vec::new();
    loop {
        let page = match pager.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(err) => {
                error!(kind = %outcome.kind, error = %err, "error read project pages");
                outcome.degraded = true;
                break;
            }
        };
        match users.extract(&page) {
            Ok(projects) => {
                tenant_ids.extend(projects.into_iter().map(|p| p.id().to_string()));
            }
            Err(err) => {
                error!(kind = %outcome.kind, error = %err, "error extract projects");
                outcome.degraded = true;
                break;
            }
        }
    }

    for tenant_id in tenant_ids {
        let lister = crate::resource::lister::FloatingIps {
            tenant_id: tenant_id.clone(),
        };
        let pager = match network.read_resources(&lister).await {
            Ok(pager) => pager,
            Err(err) if err.is_fatal() => {
                outcome.fatal = Some(err);
                return outcome;
            }
            Err(err) => {
                error!(
                    kind = %outcome.kind,
                    tenant_id = %tenant_id,
                    error = %err,
                    "error list floating ips"
                );
                outcome.degraded = true;
                continue;
            }
        };

        let (sent, degraded) = drain(outcome.kind, pager, &lister, &read).await;
        outcome.produced += sent;
        outcome.degraded |= degraded;
    }

    outcome
}

/// Drain a pager into the shared channel, page by page. Returns the number
/// of records sent and whether the drain ended early.
async fn drain(
    kind: ResourceKind,
    mut pager: crate::resource::pager::Pager,
    lister: &dyn ResourceLister,
    read: &mpsc::Sender<Resource>,
) -> (usize, bool) {
    let mut sent = 0usize;

    loop {
        let page = match pager.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => return (sent, false),
            Err(err) => {
                error!(kind = %kind, error = %err, "error read pages");
                return (sent, true);
            }
        };

        let resources = match lister.extract(&page) {
            Ok(resources) => resources,
            Err(err) => {
                error!(kind = %kind, error = %err, "error extract resources");
                return (sent, true);
            }
        };

        for resource in resources {
            if read.send(resource).await.is_err() {
                warn!(kind = %kind, "read channel closed before producer finished");
                return (sent, true);
            }
            sent += 1;
        }
    }
}

/// Pass a filtered resource through to the output stream. Detail enrichment
/// hook; accounting only needs the listing payload today.
async fn retrieve_info(resource: Option<Resource>, full_info: &mpsc::Sender<Resource>) -> bool {
    let Some(resource) = resource else {
        debug!("retrieve info: no resource");
        return false;
    };

    full_info.send(resource).await.is_ok()
}
