use std::time::Duration;

use super::DnsClient;
use crate::dns::message::{Query, Response};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{stream::FuturesUnordered, Future, StreamExt};
use tokio::time::sleep;

/// Hedged retries: a new attempt starts when the previous one fails or when
/// `next_attempt_delay` passes without an answer. The first success wins.
pub struct RetryClient<C> {
    client: C,
    attempts_count: usize,
    next_attempt_delay: Duration,
}

impl<C> RetryClient<C> {
    pub fn new(client: C, attempts_count: usize, next_attempt_delay: Duration) -> Self {
        Self {
            client,
            attempts_count,
            next_attempt_delay,
        }
    }
}

#[async_trait]
impl<C: DnsClient> DnsClient for RetryClient<C> {
    async fn send(&self, query: Query) -> Result<Response> {
        retry(
            || self.client.send(query.clone()),
            self.attempts_count,
            self.next_attempt_delay,
        )
        .await
    }

    fn shutdown(&self) {
        self.client.shutdown()
    }
}

async fn retry<F, T, E>(
    create_f: impl Fn() -> F,
    attempts: usize,
    next_attempt_delay: Duration,
) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut in_flight = FuturesUnordered::new();
    in_flight.push(create_f());
    let mut started = 1;
    loop {
        tokio::select! {
            Some(result) = in_flight.next() => match result {
                Ok(result) => return Ok(result),
                Err(_) if started < attempts => {
                    log::debug!("Attempt {} of {} failed", started, attempts);
                    in_flight.push(create_f());
                    started += 1;
                }
                Err(err) if in_flight.is_empty() => return Err(err),
                Err(_) => {}
            },
            _ = sleep(next_attempt_delay), if started < attempts => {
                in_flight.push(create_f());
                started += 1;
            }
        }
    }
}
