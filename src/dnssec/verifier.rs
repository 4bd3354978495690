use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace, warn};

use super::records::{DNSSEC_PROTOCOL, DnsKey, KeySet, Rrsig};
use super::{DnsSecAlgorithm, DnsSecError, errors::Result};
use crate::dns::DNSPacket;
use crate::dns::enums::DNSResourceType;
use crate::dns::name;
use crate::dns::resource::DNSResource;

/// Authenticates the records of one response against a signer's key set.
///
/// Stateless apart from an optional fixed clock used by tests.
#[derive(Debug, Clone, Default)]
pub struct RecordVerifier {
    current_time: Option<u32>,
}

impl RecordVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier with a fixed clock, in seconds since the epoch.
    pub fn at_time(time: u32) -> Self {
        Self {
            current_time: Some(time),
        }
    }

    pub fn set_current_time(&mut self, time: u32) {
        self.current_time = Some(time);
    }

    fn get_current_time(&self) -> u32 {
        self.current_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or_default()
        })
    }

    /// Authenticate the answer section, or the authority section when the
    /// answer is empty, as signed by `signer` with one of `keys`.
    ///
    /// Returns a copy of the packet whose section holds only the record sets
    /// that verified. A single failing signature from a trusted key aborts
    /// with a bogus error; signatures that match no trusted key make the
    /// outcome insecure.
    pub fn verify(&self, packet: &DNSPacket, signer: &str, keys: &KeySet) -> Result<DNSPacket> {
        let from_answer = !packet.answers.is_empty();
        let candidates = packet.records_of_interest();

        let mut by_tag: BTreeMap<u16, Vec<Rrsig>> = BTreeMap::new();
        for record in candidates.iter().filter(|r| r.rtype == DNSResourceType::RRSIG) {
            let rrsig = Rrsig::from_rdata(&record.name(), &record.rdata)
                .ok_or(DnsSecError::InvalidSignature)?;
            by_tag.entry(rrsig.key_tag).or_default().push(rrsig);
        }

        if by_tag.is_empty() {
            debug!("No RRSIG records to authenticate for signer {}", signer);
            return Err(DnsSecError::NoRrsig);
        }

        let now = self.get_current_time();
        let mut verified: Vec<((String, DNSResourceType), Vec<DNSResource>)> = Vec::new();
        let mut unsupported = None;

        for (tag, rrsigs) in &by_tag {
            let Some(key) = keys
                .get(tag)
                .filter(|k| k.is_zone_key() && k.protocol == DNSSEC_PROTOCOL)
            else {
                trace!("No trusted key with tag {} for signer {}", tag, signer);
                continue;
            };

            for rrsig in rrsigs {
                let set_key = (rrsig.owner.clone(), rrsig.type_covered);
                if verified.iter().any(|(k, _)| *k == set_key) {
                    continue;
                }

                let subset: Vec<&DNSResource> = candidates
                    .iter()
                    .filter(|r| r.rtype == rrsig.type_covered && name::eq(&r.name(), &rrsig.owner))
                    .collect();
                if subset.is_empty() {
                    continue;
                }

                match self.verify_rrset(rrsig, key, signer, &subset, now) {
                    Ok(()) => {
                        debug!(
                            "Verified {} {} with key {} of {}",
                            rrsig.owner, rrsig.type_covered, tag, signer
                        );
                        verified.push((set_key, subset.into_iter().cloned().collect()));
                    }
                    Err(DnsSecError::UnsupportedAlgorithm(alg)) => {
                        debug!("Skipping signature with unsupported algorithm {}", alg);
                        unsupported = Some(DnsSecError::UnsupportedAlgorithm(alg));
                    }
                    Err(e) => {
                        warn!(
                            "Signature over {} {} by key {} failed: {}",
                            rrsig.owner, rrsig.type_covered, tag, e
                        );
                        return Err(e);
                    }
                }
            }
        }

        if verified.is_empty() {
            let err = unsupported.unwrap_or(DnsSecError::NoMatchingKey);
            debug!("Nothing authenticated for signer {}: {}", signer, err);
            return Err(err);
        }

        let records: Vec<DNSResource> = verified.into_iter().flat_map(|(_, set)| set).collect();
        let mut signed = DNSPacket {
            header: packet.header.clone(),
            questions: packet.questions.clone(),
            resources: packet.resources.clone(),
            edns: packet.edns.clone(),
            ..Default::default()
        };
        if from_answer {
            signed.answers = records;
        } else {
            signed.authorities = records;
        }
        signed.header.ancount = signed.answers.len() as u16;
        signed.header.nscount = signed.authorities.len() as u16;

        Ok(signed)
    }

    /// RFC 4035 section 5.3 checks for one RRSIG over one record set.
    pub fn verify_rrset(
        &self,
        rrsig: &Rrsig,
        key: &DnsKey,
        signer: &str,
        records: &[&DNSResource],
        now: u32,
    ) -> Result<()> {
        if !name::eq(&rrsig.signer_name, signer) {
            return Err(DnsSecError::SignerMismatch {
                expected: name::fqdn(signer),
                found: rrsig.signer_name.clone(),
            });
        }
        if rrsig.algorithm != key.algorithm {
            return Err(DnsSecError::AlgorithmMismatch {
                signature: rrsig.algorithm,
                key: key.algorithm,
            });
        }
        let algorithm = DnsSecAlgorithm::from_u8(key.algorithm)
            .filter(|a| a.is_supported())
            .ok_or(DnsSecError::UnsupportedAlgorithm(key.algorithm))?;

        if rrsig.labels as usize > name::label_count(&rrsig.owner) {
            return Err(DnsSecError::InvalidSignature);
        }
        if serial_lt(now, rrsig.inception) {
            return Err(DnsSecError::SignatureNotYetValid);
        }
        if serial_lt(rrsig.expiration, now) {
            return Err(DnsSecError::SignatureExpired);
        }

        let payload = signature_payload(rrsig, records);
        algorithm.verify(&key.public_key, &payload, &rrsig.signature)
    }
}

/// RFC 1982 serial number comparison `a < b`.
fn serial_lt(a: u32, b: u32) -> bool {
    a != b && (b.wrapping_sub(a) as i32) > 0
}

/// Bytes covered by an RRSIG: its RDATA without the signature, then the
/// record set in canonical form and order (RFC 4034 sections 3.1.8.1, 6.2, 6.3).
pub fn signature_payload(rrsig: &Rrsig, records: &[&DNSResource]) -> Vec<u8> {
    let mut data = rrsig.signed_prefix();

    let mut owner_labels = name::to_labels(&rrsig.owner);
    let covered = rrsig.labels as usize;
    if covered < owner_labels.len() {
        // wildcard expansion: rebuild the "*." owner the signer saw
        let suffix = owner_labels.split_off(owner_labels.len() - covered);
        owner_labels = std::iter::once("*".to_string()).chain(suffix).collect();
    }
    let owner = name::to_wire(&owner_labels);

    let class = records.first().map(|r| u16::from(r.rclass)).unwrap_or(1);
    let mut rdatas: Vec<Vec<u8>> = records.iter().map(|r| r.canonical_rdata()).collect();
    rdatas.sort();
    rdatas.dedup();

    for rdata in rdatas {
        data.extend_from_slice(&owner);
        data.extend_from_slice(&u16::from(rrsig.type_covered).to_be_bytes());
        data.extend_from_slice(&class.to_be_bytes());
        data.extend_from_slice(&rrsig.original_ttl.to_be_bytes());
        data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(&rdata);
    }

    data
}
