//! Non-blocking DNSBL lookups: a request is validated, turned into a zone
//! query name, resolved with an A query and an optional TXT query, and its
//! result is delivered once to the requesting endpoint.

mod adapter;
mod context;
mod lifetime;
mod orchestrator;
mod query_host;
mod request;
mod service;

pub use adapter::{DnsAdapter, QueryAdapter, Record};
pub use context::{LookupResult, RequestContext, State, NOT_LISTED};
pub use lifetime::{CallerGuard, LifetimeTracker};
pub use orchestrator::{resolve, run};
pub use query_host::build_query_host;
pub use request::{validate, LookupRequest, ValidRequest, ValidationError};
pub use service::{DnsblService, OWNER};
