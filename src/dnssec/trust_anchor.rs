//! Root trust-anchor bootstrap.
//!
//! The IANA `root-anchors.xml` document is fetched together with its detached
//! PKCS#7 signature, checked against a CA pinned into the binary, filtered by
//! each entry's validity window and finally cross-checked against the live
//! root DNSKEY set.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509PurposeId};
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::query::{self, DNSSEC_UDP_SIZE};
use super::records::{DnsKey, Ds, KeySet};
use super::{DnsSecError, RecordVerifier};
use crate::dns::enums::DNSResourceType;
use crate::dns::name;
use crate::error::FetchError;
use crate::transport::{AnchorFetch, QueryExchange};

pub const ROOT_ANCHORS_URL: &str = "https://data.iana.org/root-anchors/root-anchors.xml";
pub const ROOT_ANCHORS_SIGNATURE_URL: &str = "https://data.iana.org/root-anchors/root-anchors.p7s";

static EMBEDDED_ROOT_CA: &[u8] = include_bytes!("../../certs/icann-root-ca.pem");

/// Bootstrap failures. All of them leave the process without a trust basis.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("failed to fetch trust anchors: {0}")]
    Fetch(#[from] FetchError),

    #[error("no pinned root certificate available")]
    MissingPinnedRoot,

    #[error("invalid pinned root certificate: {0}")]
    InvalidPinnedRoot(String),

    #[error("trust anchor signature rejected: {0}")]
    SignatureRejected(String),

    #[error("malformed trust anchor document: {0}")]
    MalformedDocument(String),

    #[error("no trust anchor is valid at {0}")]
    NoValidAnchors(DateTime<Utc>),

    #[error("root DNSKEY query failed: {0}")]
    RootQuery(DnsSecError),

    #[error("no root DNSKEY matches a trust anchor digest")]
    NoMatchingRootKey,

    #[error("root DNSKEY set is not signed by an anchored key: {0}")]
    NotSelfSigned(DnsSecError),
}

/// `<TrustAnchor>` root element of `root-anchors.xml`
#[derive(Debug, Clone, Deserialize)]
pub struct TrustAnchorDocument {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@source", default)]
    pub source: String,
    #[serde(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "KeyDigest", default)]
    pub key_digests: Vec<KeyDigest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyDigest {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@validFrom", default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(rename = "@validUntil", default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(rename = "KeyTag")]
    pub key_tag: u16,
    #[serde(rename = "Algorithm")]
    pub algorithm: u8,
    #[serde(rename = "DigestType")]
    pub digest_type: u8,
    #[serde(rename = "Digest")]
    pub digest: String,
}

impl TrustAnchorDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, BootstrapError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BootstrapError::MalformedDocument(e.to_string()))?;
        quick_xml::de::from_str(text).map_err(|e| BootstrapError::MalformedDocument(e.to_string()))
    }

    /// DS records for every entry valid at `now`. Entries outside their
    /// window, or with an undecodable digest, are skipped.
    pub fn valid_digests(&self, now: DateTime<Utc>) -> Vec<Ds> {
        self.key_digests
            .iter()
            .filter(|kd| {
                let valid = kd.is_valid_at(now);
                if !valid {
                    debug!("Skipping trust anchor {} (tag {}) outside its validity window", kd.id, kd.key_tag);
                }
                valid
            })
            .filter_map(|kd| kd.to_ds(&self.zone))
            .collect()
    }
}

impl KeyDigest {
    /// An entry without `validFrom` is never valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.valid_from {
            Some(from) if from <= now => self.valid_until.is_none_or(|until| now < until),
            _ => false,
        }
    }

    pub fn to_ds(&self, zone: &str) -> Option<Ds> {
        let hex_digest: String = self.digest.chars().filter(|c| !c.is_whitespace()).collect();
        let digest = hex::decode(hex_digest).ok()?;
        Some(Ds {
            zone: name::fqdn(zone),
            key_tag: self.key_tag,
            algorithm: self.algorithm,
            digest_type: self.digest_type,
            digest,
        })
    }
}

/// The certificate authority trusted to sign the anchor document.
#[derive(Clone)]
pub struct PinnedRoot {
    certs: Vec<X509>,
}

impl std::fmt::Debug for PinnedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedRoot").field("certs", &self.certs.len()).finish()
    }
}

impl PinnedRoot {
    pub fn from_pem(pem: &[u8]) -> Result<Self, BootstrapError> {
        if !pem.windows(11).any(|w| w == b"-----BEGIN ") {
            return Err(BootstrapError::MissingPinnedRoot);
        }
        let certs = X509::stack_from_pem(pem)
            .map_err(|e| BootstrapError::InvalidPinnedRoot(e.to_string()))?;
        if certs.is_empty() {
            return Err(BootstrapError::MissingPinnedRoot);
        }
        Ok(Self { certs })
    }

    /// The CA compiled into the binary.
    pub fn embedded() -> Result<Self, BootstrapError> {
        Self::from_pem(EMBEDDED_ROOT_CA)
    }

    pub fn from_file(path: &Path) -> Result<Self, BootstrapError> {
        let pem = std::fs::read(path).map_err(|e| {
            BootstrapError::InvalidPinnedRoot(format!("{}: {}", path.display(), e))
        })?;
        Self::from_pem(&pem)
    }

    /// Check a detached DER PKCS#7 signature over `content`.
    pub fn verify_detached(&self, content: &[u8], signature: &[u8]) -> Result<(), BootstrapError> {
        let rejected = |e: openssl::error::ErrorStack| BootstrapError::SignatureRejected(e.to_string());

        let pkcs7 = Pkcs7::from_der(signature).map_err(rejected)?;
        let mut builder = X509StoreBuilder::new().map_err(rejected)?;
        for cert in &self.certs {
            builder.add_cert(cert.clone()).map_err(rejected)?;
        }
        builder.set_purpose(X509PurposeId::ANY).map_err(rejected)?;
        let store = builder.build();
        let extra_certs = Stack::<X509>::new().map_err(rejected)?;

        pkcs7
            .verify(&extra_certs, &store, Some(content), None, Pkcs7Flags::BINARY)
            .map_err(rejected)
    }
}

/// Memoized root key set. The first successful bootstrap wins; later
/// writers get the cached value back.
#[derive(Debug, Default)]
pub struct RootKeyCache {
    keys: RwLock<Option<KeySet>>,
}

impl RootKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache shared by everything in this process.
    pub fn global() -> Arc<RootKeyCache> {
        static GLOBAL: OnceLock<Arc<RootKeyCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(RootKeyCache::new())).clone()
    }

    pub fn get(&self) -> Option<KeySet> {
        self.keys.read().clone()
    }

    fn store(&self, keys: KeySet) -> KeySet {
        let mut cached = self.keys.write();
        if let Some(existing) = cached.as_ref() {
            return existing.clone();
        }
        *cached = Some(keys.clone());
        keys
    }
}

/// Produces the verified root key set the chain resolver is seeded with.
pub struct TrustAnchorBootstrap {
    fetcher: Arc<dyn AnchorFetch>,
    exchange: Arc<dyn QueryExchange>,
    pinned_root: PinnedRoot,
    cache: Arc<RootKeyCache>,
    anchors_url: String,
    signature_url: String,
    verifier: RecordVerifier,
    payload_size: u16,
    current_time: Option<DateTime<Utc>>,
}

impl TrustAnchorBootstrap {
    pub fn new(
        fetcher: Arc<dyn AnchorFetch>,
        exchange: Arc<dyn QueryExchange>,
        pinned_root: PinnedRoot,
    ) -> Self {
        Self {
            fetcher,
            exchange,
            pinned_root,
            cache: Arc::new(RootKeyCache::new()),
            anchors_url: ROOT_ANCHORS_URL.to_string(),
            signature_url: ROOT_ANCHORS_SIGNATURE_URL.to_string(),
            verifier: RecordVerifier::new(),
            payload_size: DNSSEC_UDP_SIZE,
            current_time: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<RootKeyCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_urls(mut self, anchors_url: impl Into<String>, signature_url: impl Into<String>) -> Self {
        self.anchors_url = anchors_url.into();
        self.signature_url = signature_url.into();
        self
    }

    pub fn with_verifier(mut self, verifier: RecordVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_payload_size(mut self, payload_size: u16) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Evaluate anchor validity windows at a fixed instant.
    pub fn at_time(mut self, now: DateTime<Utc>) -> Self {
        self.current_time = Some(now);
        self
    }

    pub fn cache(&self) -> &Arc<RootKeyCache> {
        &self.cache
    }

    /// Verified root keys, bootstrapping on first use.
    pub async fn root_keys(&self) -> Result<KeySet, BootstrapError> {
        if let Some(keys) = self.cache.get() {
            debug!("Using cached root keys ({} keys)", keys.len());
            return Ok(keys);
        }

        let (document, signature) = tokio::try_join!(
            self.fetcher.fetch(&self.anchors_url),
            self.fetcher.fetch(&self.signature_url)
        )?;

        self.pinned_root.verify_detached(&document, &signature)?;
        debug!("Trust anchor document signature verified");

        let anchors = TrustAnchorDocument::parse(&document)?;
        if !name::eq(&anchors.zone, ".") {
            return Err(BootstrapError::MalformedDocument(format!(
                "anchors are for zone {}, not the root",
                anchors.zone
            )));
        }

        let now = self.current_time.unwrap_or_else(Utc::now);
        let digests = anchors.valid_digests(now);
        if digests.is_empty() {
            return Err(BootstrapError::NoValidAnchors(now));
        }

        let query = query::build_query(rand::random(), ".", DNSResourceType::DNSKEY, self.payload_size);
        let response = self
            .exchange
            .exchange(&query)
            .await
            .map_err(|e| BootstrapError::RootQuery(e.into()))?;
        query::check_response(&response).map_err(BootstrapError::RootQuery)?;

        let anchored: KeySet = response
            .answers
            .iter()
            .filter(|r| r.rtype == DNSResourceType::DNSKEY && name::eq(&r.name(), "."))
            .filter_map(|r| DnsKey::from_rdata(".", &r.rdata))
            .filter(|key| key.is_zone_key() && digests.iter().any(|ds| ds.matches(key)))
            .map(|key| (key.key_tag, key))
            .collect();
        if anchored.is_empty() {
            warn!("None of the root DNSKEYs matches the {} valid trust anchors", digests.len());
            return Err(BootstrapError::NoMatchingRootKey);
        }

        let verified = self
            .verifier
            .verify(&response, ".", &anchored)
            .map_err(BootstrapError::NotSelfSigned)?;

        let mut keys = anchored;
        for record in verified.answers.iter().filter(|r| r.rtype == DNSResourceType::DNSKEY) {
            if let Some(key) = DnsKey::from_rdata(".", &record.rdata) {
                keys.insert(key.key_tag, key);
            }
        }

        info!("Root trust established with {} keys", keys.len());
        Ok(self.cache.store(keys))
    }
}
