use std::net::Ipv4Addr;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::host::{EndpointId, Host};

/// A lookup as submitted by a caller. Unknown keys land in `extra` and are
/// echoed back untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LookupRequest {
    pub event: Option<String>,
    pub address: Option<String>,
    #[serde(alias = "targetEndpoint")]
    pub target_endpoint: Option<String>,
    pub zone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LookupRequest {
    pub fn new(event: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),
    #[error("`{0}` is not an IPv4 address")]
    InvalidAddress(String),
    #[error("endpoint `{0}` does not exist")]
    UnresolvableEndpoint(String),
    #[error("dnsbl service is shut down")]
    ShutDown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub event: String,
    pub address: Ipv4Addr,
    pub zone: String,
    pub requesting_endpoint: EndpointId,
    pub extra: Map<String, Value>,
}

pub fn validate(
    request: LookupRequest,
    caller: EndpointId,
    default_zone: &str,
    host: &dyn Host,
) -> Result<ValidRequest, ValidationError> {
    let event = non_empty(request.event).ok_or(ValidationError::MissingField("event"))?;
    let address = non_empty(request.address).ok_or(ValidationError::MissingField("address"))?;
    let address = address
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::InvalidAddress(address))?;
    let requesting_endpoint = match request.target_endpoint {
        Some(target) => host
            .resolve(&target)
            .ok_or(ValidationError::UnresolvableEndpoint(target))?,
        None => caller,
    };
    let zone = non_empty(request.zone).unwrap_or_else(|| default_zone.to_owned());
    Ok(ValidRequest {
        event,
        address,
        zone,
        requesting_endpoint,
        extra: request.extra,
    })
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}
