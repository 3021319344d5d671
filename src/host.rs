//! In-process host environment: addressable endpoints with mailboxes,
//! aliases and per-owner protective reference counts.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Result};
use log::{debug, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::dnsbl::LookupResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Host: Send + Sync {
    fn register(&self) -> (EndpointId, UnboundedReceiver<LookupResult>);

    fn unregister(&self, endpoint: EndpointId);

    /// Resolves an alias or the decimal form of a live endpoint id.
    fn resolve(&self, reference: &str) -> Option<EndpointId>;

    fn set_alias(&self, endpoint: EndpointId, alias: &str) -> Result<()>;

    fn remove_alias(&self, alias: &str);

    fn refcount_increment(&self, endpoint: EndpointId, owner: &str) -> usize;

    fn refcount_decrement(&self, endpoint: EndpointId, owner: &str) -> usize;

    fn deliver(&self, endpoint: EndpointId, result: LookupResult);
}

#[derive(Default)]
pub struct LocalHost {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    endpoints: HashMap<EndpointId, Endpoint>,
    aliases: HashMap<String, EndpointId>,
}

struct Endpoint {
    mailbox: UnboundedSender<LookupResult>,
    refcounts: HashMap<String, usize>,
}

impl LocalHost {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn refcount(&self, endpoint: EndpointId, owner: &str) -> usize {
        self.state()
            .endpoints
            .get(&endpoint)
            .and_then(|e| e.refcounts.get(owner).copied())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, endpoint: EndpointId) -> bool {
        self.state().endpoints.contains_key(&endpoint)
    }
}

impl Host for LocalHost {
    fn register(&self) -> (EndpointId, UnboundedReceiver<LookupResult>) {
        let (tx, rx) = unbounded_channel();
        let mut state = self.state();
        state.next_id += 1;
        let id = EndpointId(state.next_id);
        state.endpoints.insert(
            id,
            Endpoint {
                mailbox: tx,
                refcounts: HashMap::new(),
            },
        );
        debug!("Registered endpoint {}", id);
        (id, rx)
    }

    fn unregister(&self, endpoint: EndpointId) {
        let mut state = self.state();
        state.endpoints.remove(&endpoint);
        state.aliases.retain(|_, id| *id != endpoint);
        debug!("Unregistered endpoint {}", endpoint);
    }

    fn resolve(&self, reference: &str) -> Option<EndpointId> {
        let state = self.state();
        let id = match state.aliases.get(reference) {
            Some(id) => *id,
            None => EndpointId(reference.parse().ok()?),
        };
        state.endpoints.contains_key(&id).then_some(id)
    }

    fn set_alias(&self, endpoint: EndpointId, alias: &str) -> Result<()> {
        let mut state = self.state();
        if !state.endpoints.contains_key(&endpoint) {
            bail!("Endpoint {} is not registered", endpoint);
        }
        match state.aliases.get(alias) {
            Some(owner) if *owner != endpoint => {
                bail!("Alias {} is already taken by endpoint {}", alias, owner)
            }
            _ => {
                state.aliases.insert(alias.to_owned(), endpoint);
                Ok(())
            }
        }
    }

    fn remove_alias(&self, alias: &str) {
        self.state().aliases.remove(alias);
    }

    fn refcount_increment(&self, endpoint: EndpointId, owner: &str) -> usize {
        match self.state().endpoints.get_mut(&endpoint) {
            Some(e) => {
                let count = e.refcounts.entry(owner.to_owned()).or_default();
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    fn refcount_decrement(&self, endpoint: EndpointId, owner: &str) -> usize {
        let mut state = self.state();
        let Some(e) = state.endpoints.get_mut(&endpoint) else {
            return 0;
        };
        match e.refcounts.get_mut(owner) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                e.refcounts.remove(owner);
                0
            }
            None => {
                warn!("Unbalanced refcount decrement for {} on {}", owner, endpoint);
                0
            }
        }
    }

    fn deliver(&self, endpoint: EndpointId, result: LookupResult) {
        let mailbox = self
            .state()
            .endpoints
            .get(&endpoint)
            .map(|e| e.mailbox.clone());
        match mailbox {
            Some(mailbox) => {
                if mailbox.send(result).is_err() {
                    warn!("Endpoint {} stopped reading its mailbox", endpoint);
                }
            }
            None => warn!(
                "Dropping {} result for vanished endpoint {}",
                result.event, endpoint
            ),
        }
    }
}
