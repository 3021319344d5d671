use std::sync::atomic::{AtomicU16, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;

use crate::dns::{
    client::DnsClient,
    message::{Query, RecordType, ResponseCode},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: String,
}

/// `resolve(name, type)`: answers of the requested type, or a resolver error.
/// An empty list is a valid answer.
#[async_trait]
pub trait QueryAdapter: Send + Sync {
    async fn query(&self, name: &str, record_type: RecordType) -> Result<Vec<Record>>;
}

/// Query ids come from a counter with a random start, so lookups in flight
/// on a shared client never reuse an id until it wraps.
pub struct DnsAdapter<C> {
    client: C,
    next_id: AtomicU16,
}

impl<C: DnsClient> DnsAdapter<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            next_id: AtomicU16::new(rand::random()),
        }
    }
}

#[async_trait]
impl<C: DnsClient> QueryAdapter for DnsAdapter<C> {
    async fn query(&self, name: &str, record_type: RecordType) -> Result<Vec<Record>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let query = Query::new(id, name, record_type)?;
        debug!("Querying {} {}", record_type, name);
        let response = self.client.send(query).await?;
        let message = response
            .parse()
            .with_context(|| format!("Malformed response for {} {}", record_type, name))?;
        match message.header.flags.response_code {
            ResponseCode::NoError | ResponseCode::NxDomain => Ok(message
                .answers(record_type)
                .map(|r| Record {
                    data: r.data.to_text(),
                })
                .collect()),
            code => Err(anyhow!("{}", code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use super::{DnsAdapter, QueryAdapter, Record};
    use crate::dns::{
        client::DnsClient,
        message::{testing, Query, RecordType, Response},
    };
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct StubClient {
        response_code: u8,
        answers: Vec<(RecordType, Vec<u8>)>,
    }

    #[async_trait]
    impl DnsClient for StubClient {
        async fn send(&self, query: Query) -> Result<Response> {
            Ok(testing::response(&query, self.response_code, &self.answers))
        }
    }

    #[derive(Default)]
    struct IdRecorder {
        ids: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl DnsClient for IdRecorder {
        async fn send(&self, query: Query) -> Result<Response> {
            self.ids.lock().unwrap().push(query.header().id);
            Ok(testing::response(&query, 3, &[]))
        }
    }

    struct FailingClient;

    #[async_trait]
    impl DnsClient for FailingClient {
        async fn send(&self, _query: Query) -> Result<Response> {
            Err(anyhow!("Request to 127.0.0.1:53 timed out after 5s"))
        }
    }

    #[tokio::test]
    async fn should_return_records_of_requested_type() -> Result<()> {
        let adapter = DnsAdapter::new(StubClient {
            response_code: 0,
            answers: vec![
                (RecordType::A, vec![127, 0, 0, 2]),
                (RecordType::A, vec![127, 0, 0, 4]),
                (RecordType::Txt, testing::txt("ignored")),
            ],
        });

        let records = adapter.query("2.0.0.127.zen.spamhaus.org", RecordType::A).await?;

        assert_eq!(
            records,
            vec![
                Record {
                    data: "127.0.0.2".to_owned()
                },
                Record {
                    data: "127.0.0.4".to_owned()
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn should_treat_nxdomain_as_empty_answer() -> Result<()> {
        let adapter = DnsAdapter::new(StubClient {
            response_code: 3,
            answers: Vec::new(),
        });

        let records = adapter.query("5.2.0.192.zen.spamhaus.org", RecordType::A).await?;

        assert!(records.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn should_report_server_failures() {
        let adapter = DnsAdapter::new(StubClient {
            response_code: 2,
            answers: Vec::new(),
        });

        let err = adapter
            .query("5.2.0.192.zen.spamhaus.org", RecordType::A)
            .await
            .expect_err("servfail");

        assert_eq!(err.to_string(), "SERVFAIL");
    }

    #[tokio::test]
    async fn should_pass_transport_errors_through() {
        let adapter = DnsAdapter::new(FailingClient);

        let err = adapter
            .query("5.2.0.192.zen.spamhaus.org", RecordType::Txt)
            .await
            .expect_err("timeout");

        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn should_use_distinct_ids_for_successive_queries() -> Result<()> {
        let client = Arc::new(IdRecorder::default());
        let adapter = DnsAdapter::new(client.clone());

        for _ in 0..1000 {
            adapter.query("5.2.0.192.zen.spamhaus.org", RecordType::A).await?;
        }

        let ids = client.ids.lock().unwrap();
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 1000);
        Ok(())
    }
}
