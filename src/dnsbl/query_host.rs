use std::net::Ipv4Addr;

/// `1.2.3.4` under `zen.spamhaus.org` becomes `4.3.2.1.zen.spamhaus.org`.
pub fn build_query_host(address: Ipv4Addr, zone: &str) -> String {
    let [a, b, c, d] = address.octets();
    format!("{}.{}.{}.{}.{}", d, c, b, a, zone)
}
