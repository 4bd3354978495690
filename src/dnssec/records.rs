//! Typed views over the DNSSEC record kinds the chain walk inspects.
//!
//! Anything that is not one of these four kinds, or fails to parse, is
//! treated as absent.

use std::collections::{BTreeMap, HashMap};

use crate::dns::enums::DNSResourceType;
use crate::dns::resource::DNSResource;
use crate::dns::{name, rdata};

use super::{DigestType, calculate_key_tag};

/// Verified keys of one signing zone, indexed by key tag.
pub type KeySet = HashMap<u16, DnsKey>;

/// DNSKEY flag: key may sign zone data
pub const ZONE_KEY_FLAG: u16 = 0x0100;
/// DNSKEY flag: secure entry point
pub const SEP_FLAG: u16 = 0x0001;
/// The only valid DNSKEY protocol value (RFC 4034 section 2.1.2)
pub const DNSSEC_PROTOCOL: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    DnsKey(DnsKey),
    Ds(Ds),
    Rrsig(Rrsig),
    Nsec(Nsec),
}

impl RecordData {
    pub fn from_resource(record: &DNSResource) -> Option<Self> {
        let owner = record.name();
        match record.rtype {
            DNSResourceType::DNSKEY => DnsKey::from_rdata(&owner, &record.rdata).map(Self::DnsKey),
            DNSResourceType::DS => Ds::from_rdata(&owner, &record.rdata).map(Self::Ds),
            DNSResourceType::RRSIG => Rrsig::from_rdata(&owner, &record.rdata).map(Self::Rrsig),
            DNSResourceType::NSEC => Nsec::from_rdata(&owner, &record.rdata).map(Self::Nsec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsKey {
    pub zone: String,
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
    pub key_tag: u16,
}

impl DnsKey {
    pub fn new(zone: &str, flags: u16, algorithm: u8, public_key: Vec<u8>) -> Self {
        let mut key = Self {
            zone: name::fqdn(zone),
            flags,
            protocol: DNSSEC_PROTOCOL,
            algorithm,
            public_key,
            key_tag: 0,
        };
        key.key_tag = calculate_key_tag(&key.rdata());
        key
    }

    pub fn from_rdata(zone: &str, rdata: &[u8]) -> Option<Self> {
        if rdata.len() < 5 {
            return None;
        }
        Some(Self {
            zone: name::fqdn(zone),
            flags: u16::from_be_bytes([rdata[0], rdata[1]]),
            protocol: rdata[2],
            algorithm: rdata[3],
            public_key: rdata[4..].to_vec(),
            key_tag: calculate_key_tag(rdata),
        })
    }

    pub fn rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.public_key.len());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.push(self.protocol);
        out.push(self.algorithm);
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & ZONE_KEY_FLAG != 0
    }

    pub fn is_sep(&self) -> bool {
        self.flags & SEP_FLAG != 0
    }

    /// DS digest: hash of the canonical owner name followed by the RDATA.
    pub fn digest(&self, digest_type: DigestType) -> Option<Vec<u8>> {
        let mut data = name::to_canonical_wire(&self.zone);
        data.extend_from_slice(&self.rdata());
        digest_type.digest(&data)
    }

    pub fn to_ds(&self, digest_type: DigestType) -> Option<Ds> {
        Some(Ds {
            zone: self.zone.clone(),
            key_tag: self.key_tag,
            algorithm: self.algorithm,
            digest_type: digest_type.to_u8(),
            digest: self.digest(digest_type)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ds {
    /// Owner of the DS record, i.e. the child zone it vouches for
    pub zone: String,
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

impl Ds {
    pub fn from_rdata(zone: &str, rdata: &[u8]) -> Option<Self> {
        if rdata.len() < 5 {
            return None;
        }
        Some(Self {
            zone: name::fqdn(zone),
            key_tag: u16::from_be_bytes([rdata[0], rdata[1]]),
            algorithm: rdata[2],
            digest_type: rdata[3],
            digest: rdata[4..].to_vec(),
        })
    }

    pub fn rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.digest.len());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        out.push(self.algorithm);
        out.push(self.digest_type);
        out.extend_from_slice(&self.digest);
        out
    }

    /// Tag, algorithm and owner agree, and the recomputed digest is identical.
    pub fn matches(&self, key: &DnsKey) -> bool {
        if self.key_tag != key.key_tag
            || self.algorithm != key.algorithm
            || !name::eq(&self.zone, &key.zone)
        {
            return false;
        }
        DigestType::from_u8(self.digest_type)
            .and_then(|dt| key.digest(dt))
            .is_some_and(|computed| computed == self.digest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrsig {
    pub owner: String,
    pub type_covered: DNSResourceType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: String,
    pub signature: Vec<u8>,
}

impl Rrsig {
    pub fn from_rdata(owner: &str, rdata: &[u8]) -> Option<Self> {
        if rdata.len() < 19 {
            return None;
        }
        let u32_at = |i: usize| u32::from_be_bytes([rdata[i], rdata[i + 1], rdata[i + 2], rdata[i + 3]]);
        let (signer, end) = rdata::first_name(DNSResourceType::RRSIG, rdata)?;

        Some(Self {
            owner: name::fqdn(owner),
            type_covered: u16::from_be_bytes([rdata[0], rdata[1]]).into(),
            algorithm: rdata[2],
            labels: rdata[3],
            original_ttl: u32_at(4),
            expiration: u32_at(8),
            inception: u32_at(12),
            key_tag: u16::from_be_bytes([rdata[16], rdata[17]]),
            signer_name: name::from_labels(&signer),
            signature: rdata[end..].to_vec(),
        })
    }

    /// RDATA up to and including the canonical signer name, the prefix of
    /// the signed payload (RFC 4034 section 3.1.8.1).
    pub fn signed_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.signer_name.len() + 2);
        out.extend_from_slice(&u16::from(self.type_covered).to_be_bytes());
        out.push(self.algorithm);
        out.push(self.labels);
        out.extend_from_slice(&self.original_ttl.to_be_bytes());
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&self.inception.to_be_bytes());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        out.extend_from_slice(&name::to_canonical_wire(&self.signer_name));
        out
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = self.signed_prefix();
        out.extend_from_slice(&self.signature);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec {
    pub owner: String,
    pub next_name: String,
    pub types: Vec<DNSResourceType>,
}

impl Nsec {
    pub fn from_rdata(owner: &str, rdata: &[u8]) -> Option<Self> {
        let (next, end) = rdata::first_name(DNSResourceType::NSEC, rdata)?;
        Some(Self {
            owner: name::fqdn(owner),
            next_name: name::from_labels(&next),
            types: parse_type_bitmap(&rdata[end..])?,
        })
    }

    pub fn has_type(&self, rtype: DNSResourceType) -> bool {
        self.types.contains(&rtype)
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = name::to_canonical_wire(&self.next_name);
        out.extend_from_slice(&encode_type_bitmap(&self.types));
        out
    }
}

/// Decode an RFC 4034 section 4.1.2 type bitmap.
fn parse_type_bitmap(mut data: &[u8]) -> Option<Vec<DNSResourceType>> {
    let mut types = Vec::new();
    while !data.is_empty() {
        if data.len() < 2 {
            return None;
        }
        let window = data[0] as u16;
        let len = data[1] as usize;
        if len == 0 || len > 32 || data.len() < 2 + len {
            return None;
        }
        for (i, byte) in data[2..2 + len].iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    types.push(DNSResourceType::from(window * 256 + (i as u16) * 8 + bit));
                }
            }
        }
        data = &data[2 + len..];
    }
    Some(types)
}

fn encode_type_bitmap(types: &[DNSResourceType]) -> Vec<u8> {
    let mut windows: BTreeMap<u8, [u8; 32]> = BTreeMap::new();
    for &rtype in types {
        let code = u16::from(rtype);
        let bits = windows.entry((code >> 8) as u8).or_insert([0; 32]);
        let low = (code & 0xFF) as usize;
        bits[low / 8] |= 0x80 >> (low % 8);
    }

    let mut out = Vec::new();
    for (window, bits) in windows {
        let len = bits.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        out.push(window);
        out.push(len as u8);
        out.extend_from_slice(&bits[..len]);
    }
    out
}
