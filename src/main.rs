use std::{net::Ipv4Addr, sync::Arc};

use anyhow::Result;
use dnsbl::{
    config::Config,
    dnsbl::{DnsblService, LookupRequest},
    host::{EndpointId, Host, LocalHost},
    metrics::{self, Outcome},
};
use log::{info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

/// Alias of the endpoint that reads lookups from stdin and prints results.
const STDIN_ENDPOINT: &str = "stdin";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = Config::init()?;
    if let Some(bind_addr) = config.metrics_bind_addr {
        tokio::spawn(metrics::serve(bind_addr));
    }
    let host = Arc::new(LocalHost::default());
    let service = DnsblService::new(config.service, host.clone(), None).await?;
    let (caller, mut mailbox) = host.register();
    host.set_alias(caller, STDIN_ENDPOINT)?;
    info!("Starting service on zone {}, reading lookups from stdin", service.zone());

    let mut lines = BufReader::new(stdin()).lines();
    let mut reading = true;
    let mut pending = 0usize;
    loop {
        tokio::select! {
            line = lines.next_line(), if reading => match line? {
                Some(line) => match parse_request(&line) {
                    Some(request) => {
                        let replies_here = replies_to(host.as_ref(), caller, &request);
                        if service.lookup(caller, request).is_ok() && replies_here {
                            pending += 1;
                        }
                    }
                    None => warn!("Skipping unparsable line {:?}", line),
                },
                None => reading = false,
            },
            Some(result) = mailbox.recv(), if pending > 0 => {
                pending -= 1;
                println!("{}", result.to_json());
            },
            else => break,
        }
    }

    service.shutdown();
    host.unregister(caller);
    info!(
        "Stopped: {} listed, {} not listed, {} failed, {} rejected",
        metrics::lookups(Outcome::Listed),
        metrics::lookups(Outcome::NotListed),
        metrics::lookups(Outcome::Error),
        metrics::lookups(Outcome::Rejected)
    );
    Ok(())
}

/// Whether the result of `request` lands in the mailbox of `caller` rather
/// than in another endpoint's.
fn replies_to(host: &dyn Host, caller: EndpointId, request: &LookupRequest) -> bool {
    match &request.target_endpoint {
        Some(target) => host.resolve(target) == Some(caller),
        None => true,
    }
}

/// A line is either a JSON lookup request or a bare IPv4 address.
fn parse_request(line: &str) -> Option<LookupRequest> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Ok(address) = line.parse::<Ipv4Addr>() {
        return Some(LookupRequest::new("dnsbl", address.to_string()));
    }
    serde_json::from_str(line).ok()
}
