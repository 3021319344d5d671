use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_ZONE: &str = "zen.spamhaus.org";

#[derive(Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub service: ServiceConfig,
    pub metrics_bind_addr: Option<SocketAddr>,
}

impl Config {
    pub fn init() -> Result<Self> {
        let config_name = std::env::args()
            .nth(1)
            .context("Config file should be specified as first argument")?;
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&config_name))
            .build()?;
        Ok(settings.try_deserialize::<Self>()?)
    }
}

/// Immutable settings of one dnsbl service instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_zone")]
    pub zone: String,
    pub alias: Option<String>,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            alias: None,
            resolver: ResolverConfig::default(),
        }
    }
}

/// Upstreams of the private resolver, used only when none is injected.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_udp_upstreams")]
    pub udp_upstreams: Vec<SocketAddr>,
    #[serde(default)]
    pub doh_upstreams: Vec<String>,
    #[serde(default)]
    pub retry: Retry,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            udp_upstreams: default_udp_upstreams(),
            doh_upstreams: Vec::new(),
            retry: Retry::default(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
    pub attempts_count: usize,
    #[serde(with = "humantime_serde")]
    pub next_attempt_delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            attempts_count: 2,
            next_attempt_delay: Duration::from_secs(1),
        }
    }
}

fn default_zone() -> String {
    DEFAULT_ZONE.to_owned()
}

fn default_udp_upstreams() -> Vec<SocketAddr> {
    vec![SocketAddr::from(([8, 8, 8, 8], 53))]
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Config, DEFAULT_ZONE};
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> Result<Config> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    #[test]
    fn should_fill_defaults() -> Result<()> {
        let config = parse("alias: dnsbl")?;

        assert_eq!(config.service.zone, DEFAULT_ZONE);
        assert_eq!(config.service.alias.as_deref(), Some("dnsbl"));
        assert_eq!(config.service.resolver.udp_upstreams.len(), 1);
        assert_eq!(config.service.resolver.request_timeout, Duration::from_secs(5));
        assert!(config.metrics_bind_addr.is_none());
        Ok(())
    }

    #[test]
    fn should_parse_full_config() -> Result<()> {
        let config = parse(
            r#"
zone: bl.spamcop.net
metrics_bind_addr: 127.0.0.1:9153
resolver:
  udp_upstreams: ["1.1.1.1:53", "9.9.9.9:53"]
  doh_upstreams: ["https://dns.google/dns-query"]
  request_timeout: 2s
  retry:
    attempts_count: 3
    next_attempt_delay: 500ms
"#,
        )?;

        let resolver = &config.service.resolver;
        assert_eq!(config.service.zone, "bl.spamcop.net");
        assert_eq!(config.metrics_bind_addr, Some("127.0.0.1:9153".parse()?));
        assert_eq!(resolver.udp_upstreams.len(), 2);
        assert_eq!(resolver.doh_upstreams, vec!["https://dns.google/dns-query"]);
        assert_eq!(resolver.request_timeout, Duration::from_secs(2));
        assert_eq!(resolver.retry.attempts_count, 3);
        assert_eq!(resolver.retry.next_attempt_delay, Duration::from_millis(500));
        Ok(())
    }
}
