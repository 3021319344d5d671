use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use log::{info, warn};

use super::{
    adapter::{DnsAdapter, QueryAdapter},
    context::RequestContext,
    lifetime::LifetimeTracker,
    orchestrator,
    query_host::build_query_host,
    request::{validate, LookupRequest, ValidationError},
};
use crate::{
    config::ServiceConfig,
    dns::client::{create_dns_client, DnsClient},
    host::{EndpointId, Host},
    metrics::{self, Outcome},
};

/// Owner tag of every reference this service takes in the host.
pub const OWNER: &str = "dnsbl";

pub struct DnsblService {
    config: ServiceConfig,
    endpoint: EndpointId,
    host: Arc<dyn Host>,
    resolver: Arc<dyn DnsClient>,
    owns_resolver: bool,
    adapter: Arc<dyn QueryAdapter>,
    tracker: LifetimeTracker,
    stopped: AtomicBool,
}

impl DnsblService {
    /// Starts a service on `host`. Without an injected `resolver` a private one
    /// is built from `config.resolver` and shut down together with the service.
    pub async fn new(
        config: ServiceConfig,
        host: Arc<dyn Host>,
        resolver: Option<Arc<dyn DnsClient>>,
    ) -> Result<Self> {
        let (resolver, owns_resolver) = match resolver {
            Some(resolver) => (resolver, false),
            None => {
                let private: Arc<dyn DnsClient> =
                    Arc::new(create_dns_client(&config.resolver).await?);
                (private, true)
            }
        };
        let (endpoint, _mailbox) = host.register();
        let registered = match &config.alias {
            Some(alias) => host.set_alias(endpoint, alias),
            None => {
                host.refcount_increment(endpoint, OWNER);
                Ok(())
            }
        };
        if let Err(err) = registered {
            host.unregister(endpoint);
            if owns_resolver {
                resolver.shutdown();
            }
            return Err(err);
        }
        info!(
            "Started dnsbl service {} for zone {}",
            config.alias.as_deref().unwrap_or(OWNER),
            config.zone
        );
        Ok(Self {
            adapter: Arc::new(DnsAdapter::new(resolver.clone())),
            tracker: LifetimeTracker::new(host.clone(), OWNER),
            config,
            endpoint,
            host,
            resolver,
            owns_resolver,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn zone(&self) -> &str {
        &self.config.zone
    }

    /// Accepts a lookup on behalf of `caller`. The result arrives later in the
    /// requesting endpoint's mailbox; a rejected request never produces one.
    /// Must be called from within a tokio runtime.
    pub fn lookup(
        &self,
        caller: EndpointId,
        request: LookupRequest,
    ) -> Result<(), ValidationError> {
        let accepted = self.accept(caller, request);
        if let Err(err) = &accepted {
            warn!("Rejected dnsbl lookup from endpoint {}: {}", caller, err);
            metrics::record(Outcome::Rejected);
        }
        accepted
    }

    fn accept(&self, caller: EndpointId, request: LookupRequest) -> Result<(), ValidationError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ValidationError::ShutDown);
        }
        let request = validate(request, caller, &self.config.zone, self.host.as_ref())?;
        let query_host = build_query_host(request.address, &request.zone);
        let guard = self.tracker.acquire(request.requesting_endpoint);
        let context = RequestContext::new(request, query_host);
        let adapter = self.adapter.clone();
        let host = self.host.clone();
        tokio::spawn(async move {
            orchestrator::run(adapter.as_ref(), host.as_ref(), context, guard).await
        });
        Ok(())
    }

    /// Drops the service's own registration. Lookups already in flight keep
    /// running; new ones are rejected.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.config.alias {
            Some(alias) => self.host.remove_alias(alias),
            None => {
                self.host.refcount_decrement(self.endpoint, OWNER);
            }
        }
        self.host.unregister(self.endpoint);
        if self.owns_resolver {
            self.resolver.shutdown();
        }
        info!("Stopped dnsbl service for zone {}", self.config.zone);
    }
}
