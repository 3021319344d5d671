use std::net::SocketAddr;

use log::{error, info};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder, TEXT_FORMAT};
use warp::{
    http::{header::CONTENT_TYPE, Response, StatusCode},
    Filter,
};

static LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("dnsbl_lookups", "Dnsbl lookups by outcome", &["outcome"])
        .expect("dnsbl_lookups is registered once")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Listed,
    NotListed,
    Error,
    Rejected,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Listed => "listed",
            Outcome::NotListed => "not_listed",
            Outcome::Error => "error",
            Outcome::Rejected => "rejected",
        }
    }
}

pub fn record(outcome: Outcome) {
    LOOKUPS.with_label_values(&[outcome.label()]).inc();
}

pub fn lookups(outcome: Outcome) -> u64 {
    LOOKUPS.with_label_values(&[outcome.label()]).get()
}

pub async fn serve(bind_addr: SocketAddr) {
    let route = warp::path("metrics").and(warp::get()).map(|| {
        let mut buffer = Vec::new();
        match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
            Ok(()) => Response::builder()
                .header(CONTENT_TYPE, TEXT_FORMAT)
                .body(buffer),
            Err(err) => {
                error!("Failed to encode metrics: {:#}", err);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Vec::new())
            }
        }
    });
    info!("Serving metrics on {}", bind_addr);
    warp::serve(route).run(bind_addr).await
}

#[cfg(test)]
mod tests {
    use super::{lookups, record, Outcome};

    #[test]
    fn should_count_outcomes_separately() {
        let listed = lookups(Outcome::Listed);
        let rejected = lookups(Outcome::Rejected);

        record(Outcome::Rejected);

        assert!(lookups(Outcome::Rejected) > rejected);
        assert!(lookups(Outcome::Listed) >= listed);
    }
}
