use serde_json::{Map, Value};

use super::request::ValidRequest;
use crate::host::EndpointId;

pub const NOT_LISTED: &str = "NXDOMAIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingA,
    AwaitingTxt,
    NotListed,
    Listed,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::NotListed | State::Listed | State::Failed)
    }
}

/// Per-request state carried across the A and TXT phases.
#[derive(Debug)]
pub struct RequestContext {
    request: ValidRequest,
    query_host: String,
    state: State,
    response: Option<String>,
    reason: Option<String>,
    error: Option<String>,
}

impl RequestContext {
    pub fn new(request: ValidRequest, query_host: String) -> Self {
        Self {
            request,
            query_host,
            state: State::AwaitingA,
            response: None,
            reason: None,
            error: None,
        }
    }

    pub fn query_host(&self) -> &str {
        &self.query_host
    }

    pub fn event(&self) -> &str {
        &self.request.event
    }

    pub fn requesting_endpoint(&self) -> EndpointId {
        self.request.requesting_endpoint
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub(super) fn not_listed(&mut self) {
        debug_assert_eq!(self.state, State::AwaitingA);
        self.response = Some(NOT_LISTED.to_owned());
        self.error = None;
        self.state = State::NotListed;
    }

    pub(super) fn listed(&mut self, response: String) {
        debug_assert_eq!(self.state, State::AwaitingA);
        self.response = Some(response);
        self.error = None;
        self.state = State::AwaitingTxt;
    }

    pub(super) fn explained(&mut self, reason: String) {
        debug_assert_eq!(self.state, State::AwaitingTxt);
        self.reason = Some(reason);
        self.state = State::Listed;
    }

    pub(super) fn failed(&mut self, error: String) {
        debug_assert!(!self.state.is_terminal());
        self.error = Some(error);
        self.response = None;
        self.reason = None;
        self.state = State::Failed;
    }

    pub(super) fn into_result(self) -> LookupResult {
        LookupResult {
            event: self.request.event,
            address: self.request.address.to_string(),
            zone: self.request.zone,
            response: self.response,
            reason: self.reason,
            error: self.error,
            extra: self.request.extra,
        }
    }
}

/// The completion payload delivered to the requesting endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub event: String,
    pub address: String,
    pub zone: String,
    pub response: Option<String>,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub extra: Map<String, Value>,
}

impl LookupResult {
    /// Flat JSON object: passthrough keys first, then the lookup fields.
    /// Absent fields are omitted rather than null.
    pub fn to_json(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("event".to_owned(), self.event.clone().into());
        object.insert("address".to_owned(), self.address.clone().into());
        object.insert("zone".to_owned(), self.zone.clone().into());
        for (key, value) in [
            ("response", &self.response),
            ("reason", &self.reason),
            ("error", &self.error),
        ] {
            match value {
                Some(value) => object.insert(key.to_owned(), value.clone().into()),
                None => object.remove(key),
            };
        }
        Value::Object(object)
    }
}
