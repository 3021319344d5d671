use std::sync::Arc;

use crate::host::{EndpointId, Host};

/// Keeps requesting endpoints alive while their lookups are in flight.
#[derive(Clone)]
pub struct LifetimeTracker {
    host: Arc<dyn Host>,
    owner: Arc<str>,
}

impl LifetimeTracker {
    pub fn new(host: Arc<dyn Host>, owner: &str) -> Self {
        Self {
            host,
            owner: owner.into(),
        }
    }

    pub fn acquire(&self, endpoint: EndpointId) -> CallerGuard {
        self.host.refcount_increment(endpoint, &self.owner);
        CallerGuard {
            host: self.host.clone(),
            owner: self.owner.clone(),
            endpoint,
        }
    }
}

/// Releases its reference exactly once, when dropped.
#[must_use]
pub struct CallerGuard {
    host: Arc<dyn Host>,
    owner: Arc<str>,
    endpoint: EndpointId,
}

impl CallerGuard {
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }
}

impl Drop for CallerGuard {
    fn drop(&mut self) {
        self.host.refcount_decrement(self.endpoint, &self.owner);
    }
}
