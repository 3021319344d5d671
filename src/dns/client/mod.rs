use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::Url;

mod doh;
mod retry;
mod round_robin;
mod udp;

pub use doh::*;
pub use retry::*;
pub use round_robin::*;
pub use udp::*;

use super::message::{Query, Response};
use crate::config::ResolverConfig;

#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn send(&self, query: Query) -> Result<Response>;

    /// Releases sockets and background tasks. Queries sent afterwards fail.
    fn shutdown(&self) {}
}

#[async_trait]
impl<C: DnsClient + ?Sized> DnsClient for Arc<C> {
    async fn send(&self, query: Query) -> Result<Response> {
        self.as_ref().send(query).await
    }

    fn shutdown(&self) {
        self.as_ref().shutdown()
    }
}

/// Builds the resolver a service owns when none is injected: every upstream
/// behind one round robin, wrapped in hedged retries.
pub async fn create_dns_client(config: &ResolverConfig) -> Result<RetryClient<RoundRobinClient>> {
    let mut clients: Vec<Box<dyn DnsClient>> = Vec::new();
    for upstream in &config.udp_upstreams {
        clients.push(Box::new(
            UdpClient::new(*upstream, config.request_timeout).await?,
        ));
    }
    for upstream in &config.doh_upstreams {
        let url: Url = upstream
            .parse()
            .with_context(|| format!("Bad doh upstream {}", upstream))?;
        clients.push(Box::new(DohClient::new(url, config.request_timeout)?));
    }
    if clients.is_empty() {
        bail!("At least one udp or doh upstream is required");
    }
    info!(
        "Created resolver with {} udp and {} doh upstreams",
        config.udp_upstreams.len(),
        config.doh_upstreams.len()
    );
    Ok(RetryClient::new(
        RoundRobinClient::new(clients),
        config.retry.attempts_count,
        config.retry.next_attempt_delay,
    ))
}
