use std::fmt;

use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use super::DnsSecError;

/// DNSSEC algorithm numbers (RFC 4034, 5702, 6605, 8080, 8624)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DnsSecAlgorithm {
    /// RSA/MD5 (deprecated)
    RsaMd5 = 1,
    /// DSA/SHA1 (RFC 2536)
    DSA = 3,
    /// RSA/SHA-1 (RFC 3110)
    RsaSha1 = 5,
    /// DSA-NSEC3-SHA1 (RFC 5155)
    DsaNsec3Sha1 = 6,
    /// RSASHA1-NSEC3-SHA1 (RFC 5155)
    RsaSha1Nsec3Sha1 = 7,
    /// RSA/SHA-256 (RFC 5702)
    RsaSha256 = 8,
    /// RSA/SHA-512 (RFC 5702)
    RsaSha512 = 10,
    /// GOST R 34.10-2001 (RFC 5933)
    EccGost = 12,
    /// ECDSA Curve P-256 with SHA-256 (RFC 6605)
    EcdsaP256Sha256 = 13,
    /// ECDSA Curve P-384 with SHA-384 (RFC 6605)
    EcdsaP384Sha384 = 14,
    /// Ed25519 (RFC 8080)
    Ed25519 = 15,
    /// Ed448 (RFC 8080)
    Ed448 = 16,
}

impl DnsSecAlgorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::RsaMd5),
            3 => Some(Self::DSA),
            5 => Some(Self::RsaSha1),
            6 => Some(Self::DsaNsec3Sha1),
            7 => Some(Self::RsaSha1Nsec3Sha1),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            12 => Some(Self::EccGost),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            16 => Some(Self::Ed448),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if algorithm is supported for validation
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::RsaSha1
                | Self::RsaSha1Nsec3Sha1
                | Self::RsaSha256
                | Self::RsaSha512
                | Self::EcdsaP256Sha256
                | Self::EcdsaP384Sha384
                | Self::Ed25519
        )
    }

    /// Verify `sig` over `message` with DNSKEY public key material.
    ///
    /// RSA keys use the RFC 3110 exponent/modulus layout, ECDSA keys and
    /// signatures are the raw fixed-width forms of RFC 6605.
    pub fn verify(&self, public_key: &[u8], message: &[u8], sig: &[u8]) -> Result<(), DnsSecError> {
        match self {
            Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            Self::RsaSha256 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            Self::RsaSha512 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            Self::EcdsaP256Sha256 => {
                verify_ecdsa(&signature::ECDSA_P256_SHA256_FIXED, 64, public_key, message, sig)
            }
            Self::EcdsaP384Sha384 => {
                verify_ecdsa(&signature::ECDSA_P384_SHA384_FIXED, 96, public_key, message, sig)
            }
            Self::Ed25519 => {
                if public_key.len() != 32 {
                    return Err(DnsSecError::InvalidPublicKey);
                }
                UnparsedPublicKey::new(&signature::ED25519, public_key)
                    .verify(message, sig)
                    .map_err(|_| DnsSecError::SignatureVerificationFailed)
            }
            other => Err(DnsSecError::UnsupportedAlgorithm(other.to_u8())),
        }
    }
}

fn verify_rsa(
    params: &'static signature::RsaParameters,
    public_key: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<(), DnsSecError> {
    let (e, n) = rsa_components(public_key)?;
    RsaPublicKeyComponents { n, e }
        .verify(params, message, sig)
        .map_err(|_| DnsSecError::SignatureVerificationFailed)
}

/// Split an RFC 3110 key into (exponent, modulus) without leading zeros.
fn rsa_components(key: &[u8]) -> Result<(&[u8], &[u8]), DnsSecError> {
    let (&first, rest) = key.split_first().ok_or(DnsSecError::InvalidPublicKey)?;
    let (exp_len, rest) = if first == 0 {
        if rest.len() < 2 {
            return Err(DnsSecError::InvalidPublicKey);
        }
        (u16::from_be_bytes([rest[0], rest[1]]) as usize, &rest[2..])
    } else {
        (first as usize, rest)
    };
    if exp_len == 0 || rest.len() <= exp_len {
        return Err(DnsSecError::InvalidPublicKey);
    }
    let (e, n) = rest.split_at(exp_len);
    Ok((strip_leading_zeros(e), strip_leading_zeros(n)))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn verify_ecdsa(
    alg: &'static signature::EcdsaVerificationAlgorithm,
    key_len: usize,
    public_key: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<(), DnsSecError> {
    if public_key.len() != key_len {
        return Err(DnsSecError::InvalidPublicKey);
    }
    // ring expects an uncompressed SEC1 point
    let mut point = Vec::with_capacity(key_len + 1);
    point.push(0x04);
    point.extend_from_slice(public_key);
    UnparsedPublicKey::new(alg, &point)
        .verify(message, sig)
        .map_err(|_| DnsSecError::SignatureVerificationFailed)
}

impl fmt::Display for DnsSecAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaMd5 => write!(f, "RSAMD5"),
            Self::DSA => write!(f, "DSA"),
            Self::RsaSha1 => write!(f, "RSASHA1"),
            Self::DsaNsec3Sha1 => write!(f, "DSA-NSEC3-SHA1"),
            Self::RsaSha1Nsec3Sha1 => write!(f, "RSASHA1-NSEC3-SHA1"),
            Self::RsaSha256 => write!(f, "RSASHA256"),
            Self::RsaSha512 => write!(f, "RSASHA512"),
            Self::EccGost => write!(f, "ECC-GOST"),
            Self::EcdsaP256Sha256 => write!(f, "ECDSAP256SHA256"),
            Self::EcdsaP384Sha384 => write!(f, "ECDSAP384SHA384"),
            Self::Ed25519 => write!(f, "ED25519"),
            Self::Ed448 => write!(f, "ED448"),
        }
    }
}
