//! Shared fixtures: Ed25519-signed synthetic zones, an in-memory upstream
//! and a throwaway CA for anchor-document signatures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dnssec_chain::dns::DNSPacket;
use dnssec_chain::dns::edns::EdnsOpt;
use dnssec_chain::dns::enums::DNSResourceType;
use dnssec_chain::dns::name;
use dnssec_chain::dns::resource::DNSResource;
use dnssec_chain::dnssec::records::{DnsKey, Ds, KeySet, Nsec, Rrsig};
use dnssec_chain::dnssec::verifier::signature_payload;
use dnssec_chain::dnssec::{ChainResolver, DigestType, RecordVerifier};
use dnssec_chain::error::{FetchError, QueryError};
use dnssec_chain::transport::{AnchorFetch, QueryExchange};
use parking_lot::Mutex;
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Fixed clock for every signature in the fixtures
pub const NOW: u32 = 1_700_000_000;

pub const ED25519: u8 = 15;

pub fn verifier() -> RecordVerifier {
    RecordVerifier::at_time(NOW)
}

/// A zone with one Ed25519 signing key
pub struct ZoneSigner {
    pub zone: String,
    pub key: DnsKey,
    pair: Ed25519KeyPair,
}

impl ZoneSigner {
    pub fn new(zone: &str, seed: u8) -> Self {
        Self::with_flags(zone, seed, 257)
    }

    pub fn with_flags(zone: &str, seed: u8, flags: u16) -> Self {
        let pair = Ed25519KeyPair::from_seed_unchecked(&[seed; 32]).unwrap();
        let key = DnsKey::new(zone, flags, ED25519, pair.public_key().as_ref().to_vec());
        Self {
            zone: name::fqdn(zone),
            key,
            pair,
        }
    }

    pub fn key_tag(&self) -> u16 {
        self.key.key_tag
    }

    pub fn keys(&self) -> KeySet {
        [(self.key.key_tag, self.key.clone())].into_iter().collect()
    }

    pub fn dnskey(&self) -> DNSResource {
        DNSResource::new(&self.zone, DNSResourceType::DNSKEY, 3600, self.key.rdata())
    }

    pub fn ds_data(&self) -> Ds {
        self.key.to_ds(DigestType::Sha256).unwrap()
    }

    pub fn ds(&self) -> DNSResource {
        DNSResource::new(&self.zone, DNSResourceType::DS, 3600, self.ds_data().rdata())
    }

    /// RRSIG over `records` valid around [`NOW`].
    pub fn sign(&self, records: &[DNSResource]) -> DNSResource {
        self.sign_window(records, NOW - 3600, NOW + 86400)
    }

    pub fn sign_window(&self, records: &[DNSResource], inception: u32, expiration: u32) -> DNSResource {
        let owner = records[0].name();
        let labels = name::label_count(&owner) as u8;
        self.sign_full(records, labels, inception, expiration, &self.zone)
    }

    /// RRSIG with every field chosen by the caller.
    pub fn sign_full(
        &self,
        records: &[DNSResource],
        labels: u8,
        inception: u32,
        expiration: u32,
        signer: &str,
    ) -> DNSResource {
        let owner = records[0].name();
        let mut rrsig = Rrsig {
            owner: owner.clone(),
            type_covered: records[0].rtype,
            algorithm: ED25519,
            labels,
            original_ttl: records[0].ttl,
            expiration,
            inception,
            key_tag: self.key.key_tag,
            signer_name: name::fqdn(signer),
            signature: vec![],
        };
        let refs: Vec<&DNSResource> = records.iter().collect();
        let payload = signature_payload(&rrsig, &refs);
        rrsig.signature = self.pair.sign(&payload).as_ref().to_vec();
        DNSResource::new(&owner, DNSResourceType::RRSIG, records[0].ttl, rrsig.to_rdata())
    }

    /// The record set followed by its signature.
    pub fn signed(&self, records: Vec<DNSResource>) -> Vec<DNSResource> {
        let rrsig = self.sign(&records);
        let mut out = records;
        out.push(rrsig);
        out
    }
}

pub fn a_record(owner: &str, addr: [u8; 4]) -> DNSResource {
    DNSResource::new(owner, DNSResourceType::A, 300, addr.to_vec())
}

pub fn nsec_record(owner: &str, next: &str, types: &[DNSResourceType]) -> DNSResource {
    let nsec = Nsec {
        owner: name::fqdn(owner),
        next_name: name::fqdn(next),
        types: types.to_vec(),
    };
    DNSResource::new(owner, DNSResourceType::NSEC, 3600, nsec.to_rdata())
}

/// What the fake upstream returns for one question
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub rcode: u8,
    pub truncated: bool,
    pub strip_edns: bool,
}

impl Reply {
    pub fn answer(answers: Vec<DNSResource>) -> Self {
        Self {
            answers,
            ..Default::default()
        }
    }

    pub fn authority(authorities: Vec<DNSResource>) -> Self {
        Self {
            authorities,
            ..Default::default()
        }
    }
}

/// In-memory upstream. Unknown questions get an empty NXDOMAIN.
#[derive(Default)]
pub struct FakeExchange {
    replies: Mutex<HashMap<(String, DNSResourceType), Reply>>,
    log: Mutex<Vec<(String, DNSResourceType)>>,
    count: AtomicUsize,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, qname: &str, qtype: DNSResourceType, reply: Reply) {
        self.replies.lock().insert((name::fqdn(qname), qtype), reply);
    }

    pub fn query_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn queries_for(&self, qname: &str, qtype: DNSResourceType) -> usize {
        let qname = name::fqdn(qname);
        self.log
            .lock()
            .iter()
            .filter(|(n, t)| *n == qname && *t == qtype)
            .count()
    }
}

#[async_trait]
impl QueryExchange for FakeExchange {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket, QueryError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let question = query.questions.first().cloned().unwrap_or_default();
        let key = (question.name(), question.qtype);
        self.log.lock().push(key.clone());

        let reply = self.replies.lock().get(&key).cloned().unwrap_or(Reply {
            rcode: 3,
            ..Default::default()
        });

        let mut response = DNSPacket {
            header: query.header.clone(),
            questions: query.questions.clone(),
            answers: reply.answers,
            authorities: reply.authorities,
            ..Default::default()
        };
        response.header.qr = true;
        response.header.ra = true;
        response.header.rcode = reply.rcode;
        response.header.tc = reply.truncated;
        response.header.ancount = response.answers.len() as u16;
        response.header.nscount = response.authorities.len() as u16;
        if !reply.strip_edns {
            let mut edns = EdnsOpt::with_payload_size(4096);
            edns.set_do_flag(true);
            response.edns = Some(edns);
        }
        Ok(response)
    }
}

/// Signed zones `.`, `example.` and `child.example.`, with
/// `www.example.` as a plain name inside `example.`.
pub struct Hierarchy {
    pub root: ZoneSigner,
    pub example: ZoneSigner,
    pub child: ZoneSigner,
    pub exchange: Arc<FakeExchange>,
}

impl Hierarchy {
    pub fn new() -> Self {
        let h = Self {
            root: ZoneSigner::new(".", 1),
            example: ZoneSigner::new("example.", 2),
            child: ZoneSigner::new("child.example.", 3),
            exchange: Arc::new(FakeExchange::new()),
        };

        h.serve_zone(&h.root, None);
        h.serve_zone(&h.example, Some(&h.root));
        h.serve_zone(&h.child, Some(&h.example));

        h.serve_name(&h.example, "www.example.", vec![a_record("www.example.", [192, 0, 2, 1])]);
        h.serve_name(
            &h.child,
            "host.child.example.",
            vec![a_record("host.child.example.", [192, 0, 2, 7])],
        );
        h
    }

    /// Publish the DNSKEY set of `zone` and, below the root, its DS at `parent`.
    pub fn serve_zone(&self, zone: &ZoneSigner, parent: Option<&ZoneSigner>) {
        self.exchange.set(
            &zone.zone,
            DNSResourceType::DNSKEY,
            Reply::answer(zone.signed(vec![zone.dnskey()])),
        );
        if let Some(parent) = parent {
            self.exchange.set(
                &zone.zone,
                DNSResourceType::DS,
                Reply::answer(parent.signed(vec![zone.ds()])),
            );
        }
    }

    /// Serve signed `records` at `owner` in `zone`, plus the NSEC proving
    /// that `owner` is not delegated.
    pub fn serve_name(&self, zone: &ZoneSigner, owner: &str, records: Vec<DNSResource>) {
        let rtype = records[0].rtype;
        self.exchange.set(owner, rtype, Reply::answer(zone.signed(records)));
        self.deny_delegation(zone, owner);
    }

    pub fn deny_delegation(&self, zone: &ZoneSigner, owner: &str) {
        let nsec = nsec_record(
            owner,
            &zone.zone,
            &[DNSResourceType::A, DNSResourceType::RRSIG, DNSResourceType::NSEC],
        );
        self.exchange.set(owner, DNSResourceType::DS, Reply::authority(zone.signed(vec![nsec])));
    }

    pub fn resolver(&self) -> ChainResolver {
        ChainResolver::builder()
            .trust_anchors(self.root.keys())
            .exchange(self.exchange.clone())
            .verifier(verifier())
            .build()
            .unwrap()
    }
}

/// Fetcher serving fixed documents by URL
#[derive(Default)]
pub struct FakeFetcher {
    documents: HashMap<String, Vec<u8>>,
    count: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(documents: &[(&str, Vec<u8>)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(url, body)| (url.to_string(), body.clone()))
                .collect(),
            count: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorFetch for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.documents.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

pub mod pki {
    //! Throwaway CA and signer for detached PKCS#7 signatures.

    use openssl::asn1::Asn1Time;
    use openssl::bn::{BigNum, MsbOption};
    use openssl::hash::MessageDigest;
    use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::stack::Stack;
    use openssl::x509::extension::{BasicConstraints, KeyUsage};
    use openssl::x509::{X509, X509Name, X509NameBuilder, X509NameRef};

    pub struct TestCa {
        pub cert: X509,
        key: PKey<Private>,
        signer: X509,
        signer_key: PKey<Private>,
    }

    fn name(cn: &str) -> X509Name {
        let mut builder = X509NameBuilder::new().unwrap();
        builder.append_entry_by_text("CN", cn).unwrap();
        builder.build()
    }

    fn serial() -> openssl::asn1::Asn1Integer {
        let mut bn = BigNum::new().unwrap();
        bn.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        bn.to_asn1_integer().unwrap()
    }

    fn certificate(
        subject: &str,
        issuer: &X509NameRef,
        public: &PKey<Private>,
        signing_key: &PKey<Private>,
        ca: bool,
    ) -> X509 {
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name(subject)).unwrap();
        builder.set_issuer_name(issuer).unwrap();
        builder.set_pubkey(public).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        if ca {
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder
                .append_extension(
                    KeyUsage::new()
                        .critical()
                        .key_cert_sign()
                        .crl_sign()
                        .build()
                        .unwrap(),
                )
                .unwrap();
        } else {
            builder
                .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
                .unwrap();
        }
        builder.sign(signing_key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    impl TestCa {
        pub fn new(cn: &str) -> Self {
            let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let cert = certificate(cn, &name(cn), &key, &key, true);

            let signer_key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let signer = certificate("anchor signer", cert.subject_name(), &signer_key, &key, false);

            Self {
                cert,
                key,
                signer,
                signer_key,
            }
        }

        pub fn pem(&self) -> Vec<u8> {
            self.cert.to_pem().unwrap()
        }

        /// DER detached PKCS#7 signature over `content`
        pub fn sign_detached(&self, content: &[u8]) -> Vec<u8> {
            let extra = Stack::<X509>::new().unwrap();
            Pkcs7::sign(
                &self.signer,
                &self.signer_key,
                &extra,
                content,
                Pkcs7Flags::DETACHED | Pkcs7Flags::BINARY,
            )
            .unwrap()
            .to_der()
            .unwrap()
        }
    }
}
