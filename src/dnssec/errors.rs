use std::fmt;

use thiserror::Error;

use crate::dns::enums::ResponseCode;
use crate::error::QueryError;

/// Outcome classification of a verification attempt (RFC 4035 section 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityStatus {
    /// A chain of signed DNSKEY and DS records leads from a trust anchor to the data
    Secure,
    /// No chain is expected to exist, the data is usable but unverified
    Insecure,
    /// A chain was expected but did not validate
    Bogus,
    /// The check could not complete for transport or availability reasons
    Indeterminate,
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "secure"),
            Self::Insecure => write!(f, "insecure"),
            Self::Bogus => write!(f, "bogus"),
            Self::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// DNSSEC validation errors
#[derive(Error, Debug)]
pub enum DnsSecError {
    #[error("no RRSIG record found in the records to authenticate")]
    NoRrsig,

    #[error("DNSSEC signature has expired")]
    SignatureExpired,

    #[error("DNSSEC signature is not yet valid")]
    SignatureNotYetValid,

    #[error("DNSSEC signature verification failed")]
    SignatureVerificationFailed,

    #[error("malformed RRSIG record")]
    InvalidSignature,

    #[error("invalid DNSKEY public key format")]
    InvalidPublicKey,

    #[error("RRSIG signer {found} does not match expected signer {expected}")]
    SignerMismatch { expected: String, found: String },

    #[error("RRSIG algorithm {signature} does not match DNSKEY algorithm {key}")]
    AlgorithmMismatch { signature: u8, key: u8 },

    #[error("empty DS answer for {0} without an absence proof")]
    UnexplainedEmptyAnswer(String),

    #[error("absence proof for {0} lists a DS record")]
    DelegationContradicted(String),

    #[error("no presented signature matches a trusted key")]
    NoMatchingKey,

    #[error("unsupported DNSSEC algorithm: {0}")]
    UnsupportedAlgorithm(u8),

    #[error("query failed: {0}")]
    Transport(#[from] QueryError),

    #[error("response was truncated")]
    Truncated,

    #[error("upstream dropped the EDNS OPT record, signatures may be missing")]
    EdnsNotHonored,

    #[error("upstream answered {0:?}")]
    UpstreamFailure(ResponseCode),

    #[error("delegation chain deeper than {0} zones")]
    ChainTooDeep(usize),

    #[error("no verified root keys, trust anchors were not configured")]
    NoTrustAnchor,
}

impl DnsSecError {
    /// The security status this failure implies. `None` marks a fatal
    /// misconfiguration rather than a verdict on the data.
    pub fn status(&self) -> Option<SecurityStatus> {
        match self {
            Self::NoRrsig
            | Self::SignatureExpired
            | Self::SignatureNotYetValid
            | Self::SignatureVerificationFailed
            | Self::InvalidSignature
            | Self::InvalidPublicKey
            | Self::SignerMismatch { .. }
            | Self::AlgorithmMismatch { .. }
            | Self::UnexplainedEmptyAnswer(_)
            | Self::DelegationContradicted(_) => Some(SecurityStatus::Bogus),
            Self::NoMatchingKey | Self::UnsupportedAlgorithm(_) => Some(SecurityStatus::Insecure),
            Self::Transport(_)
            | Self::Truncated
            | Self::EdnsNotHonored
            | Self::UpstreamFailure(_)
            | Self::ChainTooDeep(_) => Some(SecurityStatus::Indeterminate),
            Self::NoTrustAnchor => None,
        }
    }

    pub fn is_bogus(&self) -> bool {
        self.status() == Some(SecurityStatus::Bogus)
    }

    pub fn is_insecure(&self) -> bool {
        self.status() == Some(SecurityStatus::Insecure)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.status() == Some(SecurityStatus::Indeterminate)
    }
}

pub type Result<T> = std::result::Result<T, DnsSecError>;
