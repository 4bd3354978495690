//! The two collaborator capabilities the validator depends on, plus their
//! live network implementations.

pub mod doh;
pub mod http;
pub mod udp;

pub use doh::DohExchange;
pub use http::HttpFetcher;
pub use udp::UdpExchange;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;

use crate::dns::DNSPacket;
use crate::error::{FetchError, QueryError};

/// Sends one query upstream and returns the decoded response.
///
/// Retry and server selection policy belong to the implementation.
#[async_trait]
pub trait QueryExchange: Send + Sync {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket, QueryError>;
}

/// Fetches a document by URL, failing on any non-success status.
#[async_trait]
pub trait AnchorFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Default DNS-over-HTTPS endpoints
pub const DEFAULT_DOH_SERVERS: &[&str] = &[
    "https://1.1.1.1/dns-query",
    "https://8.8.8.8/dns-query",
    "https://9.9.9.9:5053/dns-query",
];

/// Default plain DNS upstreams
pub const DEFAULT_UDP_SERVERS: [SocketAddr; 2] = [
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(1, 1, 1, 1), 53)),
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53)),
];
