//! DNSSEC-OK query construction and upstream response screening.

use tracing::debug;

use super::{DnsSecError, errors::Result};
use crate::dns::DNSPacket;
use crate::dns::enums::{DNSResourceType, ResponseCode};

/// Smallest EDNS buffer that reliably carries signature records
pub const DNSSEC_UDP_SIZE: u16 = 4096;

/// Recursive query with EDNS0, DO and CD set, so a validating upstream
/// returns signatures and unvalidated data for local checking.
pub fn build_query(id: u16, qname: &str, qtype: DNSResourceType, payload_size: u16) -> DNSPacket {
    let mut packet = DNSPacket::query(id, qname, qtype);
    packet.header.cd = true;
    packet.add_edns(payload_size.max(DNSSEC_UDP_SIZE), true);
    packet
}

/// Reject responses that cannot support a security verdict at all.
///
/// Truncation, a dropped OPT record and server-side failures say nothing
/// about tampering, so they are indeterminate rather than bogus.
pub fn check_response(response: &DNSPacket) -> Result<()> {
    if response.header.tc {
        debug!("Response {} is truncated", response.header.id);
        return Err(DnsSecError::Truncated);
    }
    match response.rcode() {
        ResponseCode::NoError | ResponseCode::NameError => {}
        other => {
            debug!("Upstream answered {:?} for {}", other, response.header.id);
            return Err(DnsSecError::UpstreamFailure(other));
        }
    }
    if response.edns.is_none() {
        debug!("Response {} carries no OPT record", response.header.id);
        return Err(DnsSecError::EdnsNotHonored);
    }
    Ok(())
}
