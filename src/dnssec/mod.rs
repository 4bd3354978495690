//! DNSSEC chain-of-trust validation.
//!
//! [`RecordVerifier`] authenticates the records of one response against a
//! zone's keys, [`KeyStore`] caches verified keys per zone,
//! [`TrustAnchorBootstrap`] produces the verified root keys and
//! [`ChainResolver`] ties them together by walking delegations top-down.

pub mod algorithm;
pub mod chain;
pub mod digest;
pub mod errors;
pub mod key_store;
pub mod key_tag;
pub mod query;
pub mod records;
pub mod trust_anchor;
pub mod verifier;

pub use algorithm::DnsSecAlgorithm;
pub use chain::{ChainResolver, ChainResolverBuilder, Resolution};
pub use digest::DigestType;
pub use errors::{DnsSecError, SecurityStatus};
pub use key_store::KeyStore;
pub use key_tag::calculate_key_tag;
pub use records::{DnsKey, Ds, KeySet, Nsec, RecordData, Rrsig};
pub use trust_anchor::{BootstrapError, PinnedRoot, RootKeyCache, TrustAnchorBootstrap};
pub use verifier::RecordVerifier;
