use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use tokio::{
    net::UdpSocket,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
    time::timeout,
};

use crate::dns::message::{Query, Response};

use super::DnsClient;

const MAX_PACKET_SIZE: usize = 4096;

pub struct UdpClient {
    server_addr: SocketAddr,
    request_timeout: Duration,
    waiters: UnboundedSender<ResponseWaiter>,
    responses_handler: JoinHandle<()>,
}

impl UdpClient {
    pub async fn new(server_addr: SocketAddr, request_timeout: Duration) -> Result<Self> {
        let bind_ip: IpAddr = if server_addr.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?;
        socket.connect(server_addr).await?;
        let (tx, rx) = unbounded_channel();
        let responses_handler = tokio::spawn(responses_handler(socket, rx));

        Ok(Self {
            server_addr,
            request_timeout,
            waiters: tx,
            responses_handler,
        })
    }
}

#[async_trait]
impl DnsClient for UdpClient {
    async fn send(&self, query: Query) -> Result<Response> {
        let (response_tx, response_rx) = oneshot::channel();
        self.waiters
            .send(ResponseWaiter {
                request: query,
                waiter: response_tx,
            })
            .map_err(|_| anyhow!("Udp client for {} is shut down", self.server_addr))?;
        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(anyhow!("Udp client for {} is shut down", self.server_addr)),
            Err(_) => Err(anyhow!(
                "Request to {} timed out after {:?}",
                self.server_addr,
                self.request_timeout
            )),
        }
    }

    fn shutdown(&self) {
        debug!("Stopping udp client for {}", self.server_addr);
        self.responses_handler.abort();
    }
}

impl Drop for UdpClient {
    fn drop(&mut self) {
        self.responses_handler.abort();
    }
}

#[derive(Debug)]
struct ResponseWaiter {
    request: Query,
    waiter: oneshot::Sender<Result<Response>>,
}

async fn responses_handler(socket: UdpSocket, mut requests: UnboundedReceiver<ResponseWaiter>) {
    let mut waiters = HashMap::new();
    loop {
        let handled = tokio::select! {
            request = requests.recv() => match request {
                Some(request) => send_request(&socket, &mut waiters, request).await,
                None => break,
            },
            response = receive_packet(&socket) => {
                response.and_then(|response| complete_waiter(&mut waiters, response))
            }
        };
        if let Err(err) = handled {
            error!("Got error while handling dns message: {:#}", err);
        }
    }
}

async fn send_request(
    socket: &UdpSocket,
    waiters: &mut HashMap<u16, ResponseWaiter>,
    waiter: ResponseWaiter,
) -> Result<()> {
    waiters.retain(|_, w| !w.waiter.is_closed());
    let request = waiter.request.clone();
    if let Some(prev_request) = waiters.insert(request.header().id, waiter) {
        let _ = prev_request.waiter.send(Err(anyhow!(
            "Duplicate request id. Previous request: {:?}. Current request: {:?}",
            prev_request.request.parse(),
            request.parse()
        )));
    }
    if let Err(err) = socket.send(request.bytes()).await {
        if let Some(waiter) = waiters.remove(&request.header().id) {
            let _ = waiter.waiter.send(Err(anyhow!("Failed to send request: {}", err)));
        }
    }
    Ok(())
}

async fn receive_packet(socket: &UdpSocket) -> Result<Bytes> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let read = socket.recv(&mut buf).await?;
    buf.truncate(read);
    Ok(Bytes::from(buf))
}

fn complete_waiter(waiters: &mut HashMap<u16, ResponseWaiter>, packet: Bytes) -> Result<()> {
    let response = Response::from_bytes(packet)?;
    if let Some(waiter) = waiters.remove(&response.header().id) {
        let response = (|| {
            let parsed_request = waiter.request.parse()?;
            let parsed_response = response.parse()?;
            if parsed_request.domains().eq(parsed_response.domains()) {
                Ok(response.clone())
            } else {
                Err(anyhow!(
                    "Request and response domains don't match. Request: {:?}. Response: {:?}",
                    parsed_request,
                    parsed_response
                ))
            }
        })();
        let _ = waiter.waiter.send(response);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::UdpClient;
    use crate::dns::{
        client::DnsClient,
        message::{testing, Query, RecordType, Response},
    };
    use anyhow::Result;
    use tokio::net::UdpSocket;

    async fn stub_server(answer: Vec<u8>) -> Result<std::net::SocketAddr> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((read, peer)) = socket.recv_from(&mut buf).await {
                let query = Query::from_bytes(buf[..read].to_vec().into()).expect("query");
                let response = testing::response(&query, 0, &[(RecordType::A, answer.clone())]);
                let _ = socket.send_to(response.bytes(), peer).await;
            }
        });
        Ok(addr)
    }

    #[tokio::test]
    async fn should_match_response_to_request() -> Result<()> {
        let addr = stub_server(vec![127, 0, 0, 2]).await?;
        let udp = UdpClient::new(addr, Duration::from_secs(5)).await?;
        let request = Query::new(0x4242, "2.0.0.127.zen.spamhaus.org", RecordType::A)?;

        let response: Response = udp.send(request).await?;
        let message = response.parse()?;

        assert_eq!(message.header.id, 0x4242);
        assert_eq!(
            message.answers(RecordType::A).next().map(|r| r.data.to_text()),
            Some("127.0.0.2".to_owned())
        );
        Ok(())
    }

    #[tokio::test]
    async fn should_time_out_without_response() -> Result<()> {
        let silent = UdpSocket::bind("127.0.0.1:0").await?;
        let udp = UdpClient::new(silent.local_addr()?, Duration::from_millis(50)).await?;
        let request = Query::new(1, "example.org", RecordType::A)?;

        let err = udp.send(request).await.expect_err("must time out");

        assert!(err.to_string().contains("timed out"));
        Ok(())
    }

    #[tokio::test]
    async fn should_fail_after_shutdown() -> Result<()> {
        let addr = stub_server(vec![127, 0, 0, 2]).await?;
        let udp = UdpClient::new(addr, Duration::from_secs(5)).await?;
        udp.shutdown();
        tokio::task::yield_now().await;

        let result = udp.send(Query::new(2, "example.org", RecordType::A)?).await;

        assert!(result.is_err());
        Ok(())
    }
}
