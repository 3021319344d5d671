pub mod config;
pub mod dns;
pub mod dnsbl;
pub mod host;
pub mod metrics;
