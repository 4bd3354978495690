//! Layout of domain names embedded in RDATA.
//!
//! Responses may compress names inside RDATA for the well-known types, so the
//! parser expands them before anything else looks at the bytes. The same
//! layout table drives the canonical form used when signatures are checked.

use super::{ParseError, common::read_name, enums::DNSResourceType, name};

/// Where names sit inside an RDATA blob: a fixed-size prefix, then `count`
/// consecutive names, then opaque bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NameLayout {
    prefix: usize,
    count: usize,
    lowercase: bool,
}

fn layout(rtype: DNSResourceType) -> Option<NameLayout> {
    let (prefix, count, lowercase) = match rtype {
        DNSResourceType::NS
        | DNSResourceType::CNAME
        | DNSResourceType::PTR
        | DNSResourceType::DNAME => (0, 1, true),
        DNSResourceType::MX => (2, 1, true),
        DNSResourceType::SOA => (0, 2, true),
        DNSResourceType::SRV => (6, 1, true),
        DNSResourceType::RRSIG => (18, 1, true),
        // The next owner name keeps its case (RFC 6840 section 5.1)
        DNSResourceType::NSEC => (0, 1, false),
        _ => return None,
    };
    Some(NameLayout {
        prefix,
        count,
        lowercase,
    })
}

/// Expand compressed names in `rdata`, resolving pointers against `packet`.
pub fn decompress(
    rtype: DNSResourceType,
    rdata: &[u8],
    packet: &[u8],
) -> Result<Vec<u8>, ParseError> {
    let Some(layout) = layout(rtype) else {
        return Ok(rdata.to_vec());
    };
    if rdata.len() < layout.prefix {
        return Err(ParseError::InvalidRdata(rtype));
    }

    let mut out = Vec::with_capacity(rdata.len() + 32);
    out.extend_from_slice(&rdata[..layout.prefix]);
    let mut pos = layout.prefix;
    for _ in 0..layout.count {
        let (labels, end) = read_name(rdata, pos, packet)?;
        out.extend_from_slice(&name::to_wire(&labels));
        pos = end;
    }
    out.extend_from_slice(&rdata[pos..]);

    Ok(out)
}

/// Canonical RDATA (RFC 4034 section 6.2): embedded names lower-cased.
///
/// Expects uncompressed input. Malformed data is returned unchanged and will
/// simply fail signature verification.
pub fn canonicalize(rtype: DNSResourceType, rdata: &[u8]) -> Vec<u8> {
    let mut out = rdata.to_vec();
    let Some(layout) = layout(rtype) else {
        return out;
    };
    if !layout.lowercase {
        return out;
    }

    let mut pos = layout.prefix;
    for _ in 0..layout.count {
        loop {
            let Some(&len) = out.get(pos) else {
                return rdata.to_vec();
            };
            if len == 0 {
                pos += 1;
                break;
            }
            if len & 0xC0 != 0 {
                return rdata.to_vec();
            }
            let end = pos + 1 + len as usize;
            let Some(label) = out.get_mut(pos + 1..end) else {
                return rdata.to_vec();
            };
            label.make_ascii_lowercase();
            pos = end;
        }
    }

    out
}

/// Read the first uncompressed name in RDATA of `rtype`, e.g. the RRSIG
/// signer or the NSEC next owner.
pub fn first_name(rtype: DNSResourceType, rdata: &[u8]) -> Option<(Vec<String>, usize)> {
    let layout = layout(rtype)?;
    read_name(rdata, layout.prefix, &[]).ok()
}
