use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceType {
    #[default]
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    DNAME,
    OPT,
    DS,
    SSHFP,
    RRSIG,
    NSEC,
    DNSKEY,
    NSEC3,
    NSEC3PARAM,
    TLSA,
    HTTPS,
    CAA,
    /// Any type code without a dedicated variant; the code is preserved.
    Unknown(u16),
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            39 => DNSResourceType::DNAME,
            41 => DNSResourceType::OPT,
            43 => DNSResourceType::DS,
            44 => DNSResourceType::SSHFP,
            46 => DNSResourceType::RRSIG,
            47 => DNSResourceType::NSEC,
            48 => DNSResourceType::DNSKEY,
            50 => DNSResourceType::NSEC3,
            51 => DNSResourceType::NSEC3PARAM,
            52 => DNSResourceType::TLSA,
            65 => DNSResourceType::HTTPS,
            257 => DNSResourceType::CAA,
            x => DNSResourceType::Unknown(x),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::DNAME => 39,
            DNSResourceType::OPT => 41,
            DNSResourceType::DS => 43,
            DNSResourceType::SSHFP => 44,
            DNSResourceType::RRSIG => 46,
            DNSResourceType::NSEC => 47,
            DNSResourceType::DNSKEY => 48,
            DNSResourceType::NSEC3 => 50,
            DNSResourceType::NSEC3PARAM => 51,
            DNSResourceType::TLSA => 52,
            DNSResourceType::HTTPS => 65,
            DNSResourceType::CAA => 257,
            DNSResourceType::Unknown(x) => x,
        }
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceType::Unknown(code) => write!(f, "TYPE{}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

impl FromStr for DNSResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let rtype = match upper.as_str() {
            "A" => DNSResourceType::A,
            "NS" => DNSResourceType::NS,
            "CNAME" => DNSResourceType::CNAME,
            "SOA" => DNSResourceType::SOA,
            "PTR" => DNSResourceType::PTR,
            "MX" => DNSResourceType::MX,
            "TXT" => DNSResourceType::TXT,
            "AAAA" => DNSResourceType::AAAA,
            "SRV" => DNSResourceType::SRV,
            "DNAME" => DNSResourceType::DNAME,
            "DS" => DNSResourceType::DS,
            "SSHFP" => DNSResourceType::SSHFP,
            "RRSIG" => DNSResourceType::RRSIG,
            "NSEC" => DNSResourceType::NSEC,
            "DNSKEY" => DNSResourceType::DNSKEY,
            "NSEC3" => DNSResourceType::NSEC3,
            "NSEC3PARAM" => DNSResourceType::NSEC3PARAM,
            "TLSA" => DNSResourceType::TLSA,
            "HTTPS" => DNSResourceType::HTTPS,
            "CAA" => DNSResourceType::CAA,
            other => {
                let code = other
                    .strip_prefix("TYPE")
                    .and_then(|n| n.parse::<u16>().ok())
                    .ok_or_else(|| format!("unknown record type: {}", s))?;
                DNSResourceType::from(code)
            }
        };
        Ok(rtype)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceClass {
    #[default]
    IN,
    CS,
    CH,
    HS,
    /// Non-standard class value (OPT records carry the UDP payload size here)
    Unknown(u16),
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            2 => DNSResourceClass::CS,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            x => DNSResourceClass::Unknown(x),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(value: DNSResourceClass) -> Self {
        match value {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CS => 2,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::Unknown(x) => x,
        }
    }
}

impl fmt::Display for DNSResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceClass::Unknown(code) => write!(f, "CLASS{}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Response codes from the 4-bit RCODE header field
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Other(u8),
}

impl ResponseCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormatError,
            2 => Self::ServerFailure,
            3 => Self::NameError,
            4 => Self::NotImplemented,
            5 => Self::Refused,
            x => Self::Other(x),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormatError => 1,
            Self::ServerFailure => 2,
            Self::NameError => 3,
            Self::NotImplemented => 4,
            Self::Refused => 5,
            Self::Other(x) => x,
        }
    }
}
