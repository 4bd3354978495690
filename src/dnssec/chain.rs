use std::sync::Arc;

use tracing::{debug, info, trace};

use super::query::{self, DNSSEC_UDP_SIZE};
use super::records::{DnsKey, Ds, KeySet, Nsec};
use super::{DigestType, DnsSecAlgorithm, DnsSecError, KeyStore, RecordVerifier, SecurityStatus, errors::Result};
use crate::dns::DNSPacket;
use crate::dns::enums::DNSResourceType;
use crate::dns::name;
use crate::error::ConfigError;
use crate::transport::QueryExchange;

/// Default ceiling on the number of zones walked for one name
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Outcome of [`ChainResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// `Secure` or `Insecure`; every other outcome is an error
    pub status: SecurityStatus,
    /// The authenticated records when secure, the raw response when insecure
    pub response: DNSPacket,
}

impl Resolution {
    pub fn is_secure(&self) -> bool {
        self.status == SecurityStatus::Secure
    }
}

#[derive(Default)]
pub struct ChainResolverBuilder {
    trust_anchors: Option<KeySet>,
    exchange: Option<Arc<dyn QueryExchange>>,
    key_store: Option<Arc<KeyStore>>,
    verifier: Option<RecordVerifier>,
    max_depth: Option<usize>,
    payload_size: Option<u16>,
}

impl ChainResolverBuilder {
    /// Verified root keys, usually from the trust-anchor bootstrap. Required.
    pub fn trust_anchors(mut self, keys: KeySet) -> Self {
        self.trust_anchors = Some(keys);
        self
    }

    /// Upstream query collaborator. Required.
    pub fn exchange(mut self, exchange: Arc<dyn QueryExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Share a key store between resolvers.
    pub fn key_store(mut self, key_store: Arc<KeyStore>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    pub fn verifier(mut self, verifier: RecordVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn payload_size(mut self, payload_size: u16) -> Self {
        self.payload_size = Some(payload_size);
        self
    }

    pub fn build(self) -> std::result::Result<ChainResolver, ConfigError> {
        let trust_anchors = self
            .trust_anchors
            .filter(|keys| !keys.is_empty())
            .ok_or(ConfigError::MissingTrustAnchors)?;
        let exchange = self.exchange.ok_or(ConfigError::MissingQueryExchange)?;

        let key_store = self.key_store.unwrap_or_default();
        key_store.record(".", ".", trust_anchors);

        Ok(ChainResolver {
            exchange,
            key_store,
            verifier: self.verifier.unwrap_or_default(),
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            payload_size: self.payload_size.unwrap_or(DNSSEC_UDP_SIZE),
        })
    }
}

/// Walks the delegation chain from the root to a name, caching every
/// verified zone key set on the way, and authenticates answers with it.
pub struct ChainResolver {
    exchange: Arc<dyn QueryExchange>,
    key_store: Arc<KeyStore>,
    verifier: RecordVerifier,
    max_depth: usize,
    payload_size: u16,
}

impl ChainResolver {
    pub fn builder() -> ChainResolverBuilder {
        ChainResolverBuilder::default()
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Query `name`/`rtype` and authenticate the answer.
    ///
    /// Insecure outcomes are returned as `Ok` with the unverified response;
    /// bogus and indeterminate outcomes are errors.
    pub async fn resolve(&self, name: &str, rtype: DNSResourceType) -> Result<Resolution> {
        let qname = name::fqdn(name);
        let response = self.query(&qname, rtype).await?;

        let outcome = match self.verified_keys_for(&qname).await {
            Ok((signer, keys)) => self.verifier.verify(&response, &signer, &keys),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(signed) => {
                debug!("{} {} is secure", qname, rtype);
                Ok(Resolution {
                    status: SecurityStatus::Secure,
                    response: signed,
                })
            }
            Err(e) if e.is_insecure() => {
                info!("{} {} is insecure: {}", qname, rtype, e);
                Ok(Resolution {
                    status: SecurityStatus::Insecure,
                    response,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Signing zone and verified key set responsible for `zone`.
    ///
    /// Walks up to the nearest cached ancestor, then authenticates each zone
    /// below it top-down, so no child is trusted before its parent.
    pub async fn verified_keys_for(&self, zone: &str) -> Result<(String, KeySet)> {
        let zone = name::fqdn(zone);
        let mut pending = Vec::new();
        let mut current = zone;
        let (mut signer, mut keys) = loop {
            if let Some(hit) = self.key_store.lookup(&current) {
                break hit;
            }
            if current == "." {
                return Err(DnsSecError::NoTrustAnchor);
            }
            if pending.len() >= self.max_depth {
                return Err(DnsSecError::ChainTooDeep(self.max_depth));
            }
            trace!("{} not cached, deferring to its parent", current);
            let parent = name::parent(&current);
            pending.push(current);
            current = parent;
        };

        while let Some(child) = pending.pop() {
            (signer, keys) = self.authenticate_zone(&child, &signer, &keys).await?;
        }

        Ok((signer, keys))
    }

    /// Drop a zone from the key store, e.g. after learning it was re-delegated.
    pub fn invalidate(&self, zone: &str) {
        self.key_store.mark_empty(zone);
    }

    async fn query(&self, qname: &str, rtype: DNSResourceType) -> Result<DNSPacket> {
        let query = query::build_query(rand::random(), qname, rtype, self.payload_size);
        let response = self.exchange.exchange(&query).await?;
        query::check_response(&response)?;
        Ok(response)
    }

    /// Authenticate `zone` given the verified keys of the zone above it.
    async fn authenticate_zone(
        &self,
        zone: &str,
        parent_signer: &str,
        parent_keys: &KeySet,
    ) -> Result<(String, KeySet)> {
        debug!("Authenticating {} via {}", zone, parent_signer);

        let (dnskey_response, ds_response) = tokio::try_join!(
            self.query(zone, DNSResourceType::DNSKEY),
            self.query(zone, DNSResourceType::DS)
        )?;

        let ds_signed = self.verifier.verify(&ds_response, parent_signer, parent_keys)?;
        let ds_set: Vec<Ds> = ds_signed
            .answers
            .iter()
            .filter(|r| r.rtype == DNSResourceType::DS && name::eq(&r.name(), zone))
            .filter_map(|r| Ds::from_rdata(zone, &r.rdata))
            .collect();

        if ds_set.is_empty() {
            return self.inherit_parent(zone, &ds_signed, parent_signer, parent_keys);
        }

        let delegated: KeySet = dnskey_response
            .answers
            .iter()
            .filter(|r| r.rtype == DNSResourceType::DNSKEY && name::eq(&r.name(), zone))
            .filter_map(|r| DnsKey::from_rdata(zone, &r.rdata))
            .filter(|key| key.is_zone_key() && ds_set.iter().any(|ds| ds.matches(key)))
            .map(|key| (key.key_tag, key))
            .collect();

        if delegated.is_empty() && !ds_set.iter().any(is_usable_ds) {
            return Err(DnsSecError::UnsupportedAlgorithm(ds_set[0].algorithm));
        }
        // an empty match (key rollover gap) leaves the verifier without a trusted key
        debug!("{} DS-matched keys for {}", delegated.len(), zone);

        let dnskey_signed = self.verifier.verify(&dnskey_response, zone, &delegated)?;

        let mut keys = delegated;
        for record in dnskey_signed.answers.iter().filter(|r| r.rtype == DNSResourceType::DNSKEY) {
            if let Some(key) = DnsKey::from_rdata(zone, &record.rdata) {
                keys.insert(key.key_tag, key);
            }
        }

        self.key_store.record(zone, zone, keys.clone());
        Ok((name::fqdn(zone), keys))
    }

    /// Empty DS answer: accept only an authenticated NSEC for exactly `zone`
    /// that does not list DS, and let the zone share its parent's keys.
    fn inherit_parent(
        &self,
        zone: &str,
        ds_signed: &DNSPacket,
        parent_signer: &str,
        parent_keys: &KeySet,
    ) -> Result<(String, KeySet)> {
        let proof = ds_signed
            .authorities
            .iter()
            .filter(|r| r.rtype == DNSResourceType::NSEC && name::eq(&r.name(), zone))
            .find_map(|r| Nsec::from_rdata(zone, &r.rdata));

        match proof {
            Some(nsec) if nsec.has_type(DNSResourceType::DS) => {
                Err(DnsSecError::DelegationContradicted(zone.to_string()))
            }
            Some(_) => {
                debug!("{} has no delegation, aliasing to {}", zone, parent_signer);
                self.key_store.record(zone, parent_signer, parent_keys.clone());
                Ok((name::fqdn(parent_signer), parent_keys.clone()))
            }
            None => Err(DnsSecError::UnexplainedEmptyAnswer(zone.to_string())),
        }
    }
}

/// A DS this resolver could have matched a key against.
fn is_usable_ds(ds: &Ds) -> bool {
    DnsSecAlgorithm::from_u8(ds.algorithm).is_some_and(|a| a.is_supported())
        && DigestType::from_u8(ds.digest_type).is_some_and(|d| d.digest(&[]).is_some())
}
