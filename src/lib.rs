pub mod config;
pub mod dns;
pub mod dnssec;
pub mod error;
pub mod transport;

pub use dns::DNSPacket;
pub use dnssec::{ChainResolver, Resolution, SecurityStatus, TrustAnchorBootstrap};
