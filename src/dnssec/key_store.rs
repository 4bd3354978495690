use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::records::KeySet;
use crate::dns::name;

const ROOT: &str = ".";

/// Cache of verified zone keys.
///
/// Maps every resolved zone to the zone that signs it, and every signing
/// zone to its verified key set. Readers get clones, never references into
/// the cache.
#[derive(Debug, Default)]
pub struct KeyStore {
    inner: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    keys: HashMap<String, KeySet>,
    signing_zones: HashMap<String, String>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with already verified root keys.
    pub fn with_trust_anchors(root_keys: KeySet) -> Self {
        let store = Self::new();
        store.record(ROOT, ROOT, root_keys);
        store
    }

    /// Signing zone and its key set for `zone`, if both are cached.
    pub fn lookup(&self, zone: &str) -> Option<(String, KeySet)> {
        let zone = name::fqdn(zone);
        let entries = self.inner.read();
        let signer = entries.signing_zones.get(&zone)?;
        let keys = entries.keys.get(signer)?;
        trace!("Key store hit for {} (signed by {})", zone, signer);
        Some((signer.clone(), keys.clone()))
    }

    /// Merge `keys` into the entry of `signer` and alias `zone` to it.
    pub fn record(&self, zone: &str, signer: &str, keys: KeySet) {
        let zone = name::fqdn(zone);
        let signer = name::fqdn(signer);
        let mut entries = self.inner.write();
        let cached = entries.keys.entry(signer.clone()).or_default();
        cached.extend(keys);
        debug!("Key store: {} -> {} ({} keys)", zone, signer, cached.len());
        entries.signing_zones.insert(zone, signer);
    }

    /// Forget `zone` and the key set it aliases to. The root entry, which
    /// holds the trust anchors, is kept.
    pub fn mark_empty(&self, zone: &str) {
        let zone = name::fqdn(zone);
        let mut entries = self.inner.write();
        if let Some(signer) = entries.signing_zones.remove(&zone) {
            if signer != ROOT {
                entries.keys.remove(&signer);
            }
            debug!("Key store: dropped {} (was signed by {})", zone, signer);
        }
        if zone == ROOT {
            entries.signing_zones.insert(zone.clone(), zone);
        }
    }

    pub fn signing_zone(&self, zone: &str) -> Option<String> {
        self.inner.read().signing_zones.get(&name::fqdn(zone)).cloned()
    }

    /// Number of zones with a cached entry or alias
    pub fn len(&self) -> usize {
        self.inner.read().signing_zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnssec::records::DnsKey;

    fn keys(zone: &str, seeds: &[u8]) -> KeySet {
        seeds
            .iter()
            .map(|&s| {
                let key = DnsKey::new(zone, 257, 15, vec![s; 32]);
                (key.key_tag, key)
            })
            .collect()
    }

    #[test]
    fn test_record_merges_keys() {
        let store = KeyStore::new();
        store.record("example.", "example.", keys("example.", &[1]));
        store.record("example.", "example.", keys("example.", &[2]));

        let (signer, cached) = store.lookup("example.").unwrap();
        assert_eq!(signer, "example.");
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn test_root_survives_mark_empty() {
        let store = KeyStore::with_trust_anchors(keys(".", &[9]));
        store.record("child.", ".", KeySet::new());
        store.mark_empty("child.");
        store.mark_empty(".");

        assert!(store.lookup("child.").is_none());
        assert_eq!(store.lookup(".").map(|(_, k)| k.len()), Some(1));
    }
}
