use super::ParseError;

/// DNSSEC OK bit in the OPT flags word (RFC 3225)
pub const DO_FLAG: u16 = 0x8000;

/// EDNS0 OPT pseudo-record (RFC 6891)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOpt {
    /// Largest UDP response the sender can reassemble
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub flags: u16,
    pub options: Vec<EdnsOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl Default for EdnsOpt {
    fn default() -> Self {
        Self::with_payload_size(4096)
    }
}

impl EdnsOpt {
    pub fn with_payload_size(payload_size: u16) -> Self {
        Self {
            udp_payload_size: payload_size,
            extended_rcode: 0,
            version: 0,
            flags: 0,
            options: Vec::new(),
        }
    }

    pub fn do_flag(&self) -> bool {
        (self.flags & DO_FLAG) != 0
    }

    pub fn set_do_flag(&mut self, value: bool) {
        if value {
            self.flags |= DO_FLAG;
        } else {
            self.flags &= !DO_FLAG;
        }
    }

    /// Decode the OPT fields: CLASS carries the payload size and TTL packs
    /// extended RCODE, version and flags.
    pub fn parse_from_resource(class: u16, ttl: u32, rdata: &[u8]) -> Result<Self, ParseError> {
        let mut options = Vec::new();
        let mut pos = 0;

        while pos + 4 <= rdata.len() {
            let code = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
            let len = u16::from_be_bytes([rdata[pos + 2], rdata[pos + 3]]) as usize;
            pos += 4;

            let data = rdata
                .get(pos..pos + len)
                .ok_or(ParseError::InvalidAdditionalSection)?
                .to_vec();
            pos += len;
            options.push(EdnsOption { code, data });
        }

        Ok(EdnsOpt {
            udp_payload_size: class,
            extended_rcode: ((ttl >> 24) & 0xFF) as u8,
            version: ((ttl >> 16) & 0xFF) as u8,
            flags: (ttl & 0xFFFF) as u16,
            options,
        })
    }

    /// Encode back into `(class, ttl, rdata)`.
    pub fn to_resource_format(&self) -> (u16, u32, Vec<u8>) {
        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | (self.flags as u32);

        let mut rdata = Vec::new();
        for option in &self.options {
            rdata.extend_from_slice(&option.code.to_be_bytes());
            rdata.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
            rdata.extend_from_slice(&option.data);
        }

        (self.udp_payload_size, ttl, rdata)
    }
}

impl std::fmt::Display for EdnsOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EDNS{}: payload={}, flags=0x{:04x}{}, options={}",
            self.version,
            self.udp_payload_size,
            self.flags,
            if self.do_flag() { " (DO)" } else { "" },
            self.options.len()
        )
    }
}
