use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::BytesMut;
use reqwest::{header::HeaderMap, header::HeaderValue, Client, Url};

use super::DnsClient;
use crate::dns::message::{Query, Response};

pub struct DohClient {
    http_client: Client,
    server_url: Url,
}

impl DohClient {
    pub fn new(server_url: Url, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/dns-message"),
        );
        let http_client = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            server_url,
        })
    }
}

#[async_trait]
impl DnsClient for DohClient {
    async fn send(&self, query: Query) -> Result<Response> {
        let request = query.bytes();
        let response = self
            .http_client
            .get(self.server_url.clone())
            .query(&[("dns", encode_request(request))])
            .send()
            .await
            .with_context(|| format!("Doh request to {} failed", self.server_url))?
            .error_for_status()?;
        let mut body = BytesMut::from(response.bytes().await?.as_ref());
        if body.len() < 2 {
            return Err(anyhow!("Bad dns packet from {}", self.server_url));
        }
        body[0..2].copy_from_slice(&request[0..2]);
        Response::from_bytes(body.freeze())
    }
}

/// RFC 8484 GET encoding. The id is zeroed so identical questions share http caches.
fn encode_request(request: &[u8]) -> String {
    let mut without_id = BytesMut::from(request);
    without_id[0..2].copy_from_slice(&[0, 0]);
    URL_SAFE_NO_PAD.encode(&without_id)
}
