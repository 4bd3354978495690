mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::pki::TestCa;
use common::*;
use dnssec_chain::dns::enums::DNSResourceType;
use dnssec_chain::dnssec::trust_anchor::{ROOT_ANCHORS_SIGNATURE_URL, ROOT_ANCHORS_URL};
use dnssec_chain::dnssec::{BootstrapError, ChainResolver, PinnedRoot, RootKeyCache, TrustAnchorBootstrap};

const ANCHORS_URL: &str = "https://anchors.test/root-anchors.xml";
const SIGNATURE_URL: &str = "https://anchors.test/root-anchors.p7s";

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(NOW as i64, 0).unwrap()
}

fn key_digest(signer: &ZoneSigner, valid_from: Option<&str>, valid_until: Option<&str>) -> String {
    let ds = signer.ds_data();
    let mut attrs = String::new();
    if let Some(from) = valid_from {
        attrs.push_str(&format!(" validFrom=\"{}\"", from));
    }
    if let Some(until) = valid_until {
        attrs.push_str(&format!(" validUntil=\"{}\"", until));
    }
    format!(
        "<KeyDigest id=\"k{tag}\"{attrs}>\n<KeyTag>{tag}</KeyTag>\n<Algorithm>{alg}</Algorithm>\n\
         <DigestType>2</DigestType>\n<Digest>{digest}</Digest>\n</KeyDigest>\n",
        tag = ds.key_tag,
        attrs = attrs,
        alg = ds.algorithm,
        digest = hex::encode_upper(&ds.digest),
    )
}

fn document(zone: &str, digests: &[String]) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <TrustAnchor id=\"test\" source=\"{}\">\n<Zone>{}</Zone>\n{}</TrustAnchor>\n",
        ANCHORS_URL,
        zone,
        digests.concat()
    )
    .into_bytes()
}

struct Setup {
    root: ZoneSigner,
    ca: TestCa,
    exchange: Arc<FakeExchange>,
}

impl Setup {
    fn new() -> Self {
        let root = ZoneSigner::new(".", 1);
        let exchange = Arc::new(FakeExchange::new());
        exchange.set(
            ".",
            DNSResourceType::DNSKEY,
            Reply::answer(root.signed(vec![root.dnskey()])),
        );
        Self {
            root,
            ca: TestCa::new("Test Root Anchors CA"),
            exchange,
        }
    }

    fn signed_document(&self, doc: Vec<u8>) -> Arc<FakeFetcher> {
        let signature = self.ca.sign_detached(&doc);
        Arc::new(FakeFetcher::new(&[(ANCHORS_URL, doc), (SIGNATURE_URL, signature)]))
    }

    fn valid_document(&self) -> Vec<u8> {
        document(".", &[key_digest(&self.root, Some("2017-02-02T00:00:00+00:00"), None)])
    }

    fn bootstrap(&self, fetcher: Arc<FakeFetcher>) -> TrustAnchorBootstrap {
        TrustAnchorBootstrap::new(
            fetcher,
            self.exchange.clone(),
            PinnedRoot::from_pem(&self.ca.pem()).unwrap(),
        )
        .with_urls(ANCHORS_URL, SIGNATURE_URL)
        .with_verifier(verifier())
        .at_time(now())
    }
}

#[test]
fn test_default_urls_point_at_iana() {
    assert!(ROOT_ANCHORS_URL.ends_with("root-anchors.xml"));
    assert!(ROOT_ANCHORS_SIGNATURE_URL.ends_with("root-anchors.p7s"));
}

#[tokio::test]
async fn test_bootstrap_yields_verified_root_keys() {
    let setup = Setup::new();
    let fetcher = setup.signed_document(setup.valid_document());
    let bootstrap = setup.bootstrap(fetcher.clone());

    let keys = bootstrap.root_keys().await.unwrap();

    assert_eq!(keys.len(), 1);
    assert!(keys.contains_key(&setup.root.key_tag()));
    assert_eq!(bootstrap.cache().get(), Some(keys));
    assert_eq!(fetcher.fetch_count(), 2);
    assert_eq!(setup.exchange.query_count(), 1);
}

#[tokio::test]
async fn test_bootstrap_is_memoized() {
    let setup = Setup::new();
    let fetcher = setup.signed_document(setup.valid_document());
    let bootstrap = setup.bootstrap(fetcher.clone());

    let first = bootstrap.root_keys().await.unwrap();
    let second = bootstrap.root_keys().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.fetch_count(), 2);
    assert_eq!(setup.exchange.query_count(), 1);
}

#[tokio::test]
async fn test_shared_cache_skips_second_bootstrap() {
    let setup = Setup::new();
    let cache = Arc::new(RootKeyCache::new());
    let first_fetcher = setup.signed_document(setup.valid_document());
    setup
        .bootstrap(first_fetcher)
        .with_cache(cache.clone())
        .root_keys()
        .await
        .unwrap();

    let second_fetcher = Arc::new(FakeFetcher::default());
    let keys = setup
        .bootstrap(second_fetcher.clone())
        .with_cache(cache)
        .root_keys()
        .await
        .unwrap();

    assert!(keys.contains_key(&setup.root.key_tag()));
    assert_eq!(second_fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_includes_keys_signed_by_anchored_key() {
    let setup = Setup::new();
    let zsk = ZoneSigner::with_flags(".", 7, 256);
    let dnskeys = vec![setup.root.dnskey(), zsk.dnskey()];
    setup.exchange.set(
        ".",
        DNSResourceType::DNSKEY,
        Reply::answer(setup.root.signed(dnskeys)),
    );

    let fetcher = setup.signed_document(setup.valid_document());
    let keys = setup.bootstrap(fetcher).root_keys().await.unwrap();

    assert_eq!(keys.len(), 2);
    assert!(keys.contains_key(&zsk.key_tag()));
}

#[tokio::test]
async fn test_tampered_document_is_rejected() {
    let setup = Setup::new();
    let doc = setup.valid_document();
    let signature = setup.ca.sign_detached(&doc);
    let mut tampered = doc.clone();
    tampered.extend_from_slice(b"<!-- appended -->");
    let fetcher = Arc::new(FakeFetcher::new(&[(ANCHORS_URL, tampered), (SIGNATURE_URL, signature)]));

    let bootstrap = setup.bootstrap(fetcher);
    let err = bootstrap.root_keys().await.unwrap_err();

    assert!(matches!(err, BootstrapError::SignatureRejected(_)));
    assert!(bootstrap.cache().get().is_none());
    assert_eq!(setup.exchange.query_count(), 0);
}

#[tokio::test]
async fn test_signature_from_untrusted_ca_is_rejected() {
    let setup = Setup::new();
    let other_ca = TestCa::new("Somebody Else");
    let doc = setup.valid_document();
    let signature = other_ca.sign_detached(&doc);
    let fetcher = Arc::new(FakeFetcher::new(&[(ANCHORS_URL, doc), (SIGNATURE_URL, signature)]));

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::SignatureRejected(_)));
}

#[tokio::test]
async fn test_garbage_signature_is_rejected() {
    let setup = Setup::new();
    let fetcher = Arc::new(FakeFetcher::new(&[
        (ANCHORS_URL, setup.valid_document()),
        (SIGNATURE_URL, b"not a pkcs7 blob".to_vec()),
    ]));

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::SignatureRejected(_)));
}

#[tokio::test]
async fn test_fetch_failure_is_fatal() {
    let setup = Setup::new();
    let fetcher = Arc::new(FakeFetcher::new(&[(ANCHORS_URL, setup.valid_document())]));

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Fetch(_)));
}

#[tokio::test]
async fn test_expired_anchor_is_excluded() {
    let setup = Setup::new();
    let doc = document(
        ".",
        &[key_digest(
            &setup.root,
            Some("2010-07-15T00:00:00+00:00"),
            Some("2019-01-11T00:00:00+00:00"),
        )],
    );
    let fetcher = setup.signed_document(doc);

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::NoValidAnchors(_)));
}

#[tokio::test]
async fn test_anchor_without_valid_from_is_excluded() {
    let setup = Setup::new();
    let doc = document(".", &[key_digest(&setup.root, None, None)]);
    let fetcher = setup.signed_document(doc);

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::NoValidAnchors(_)));
}

#[tokio::test]
async fn test_anchor_for_other_zone_is_malformed() {
    let setup = Setup::new();
    let doc = document("example.", &[key_digest(&setup.root, Some("2017-02-02T00:00:00+00:00"), None)]);
    let fetcher = setup.signed_document(doc);

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::MalformedDocument(_)));
}

#[tokio::test]
async fn test_no_root_key_matches_digest() {
    let setup = Setup::new();
    let retired = ZoneSigner::new(".", 50);
    let doc = document(".", &[key_digest(&retired, Some("2017-02-02T00:00:00+00:00"), None)]);
    let fetcher = setup.signed_document(doc);

    let err = setup.bootstrap(fetcher).root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::NoMatchingRootKey));
}

#[tokio::test]
async fn test_root_set_signed_by_other_key_is_rejected() {
    let setup = Setup::new();
    let intruder = ZoneSigner::new(".", 60);
    let dnskeys = vec![setup.root.dnskey(), intruder.dnskey()];
    setup.exchange.set(
        ".",
        DNSResourceType::DNSKEY,
        Reply::answer(intruder.signed(dnskeys)),
    );
    let fetcher = setup.signed_document(setup.valid_document());

    let bootstrap = setup.bootstrap(fetcher);
    let err = bootstrap.root_keys().await.unwrap_err();
    assert!(matches!(err, BootstrapError::NotSelfSigned(_)));
    assert!(bootstrap.cache().get().is_none());
}

#[tokio::test]
async fn test_bootstrapped_keys_seed_chain_resolver() {
    let h = Hierarchy::new();
    let ca = TestCa::new("Test Root Anchors CA");
    let doc = document(".", &[key_digest(&h.root, Some("2017-02-02T00:00:00+00:00"), None)]);
    let signature = ca.sign_detached(&doc);
    let fetcher = Arc::new(FakeFetcher::new(&[(ANCHORS_URL, doc), (SIGNATURE_URL, signature)]));

    let root_keys = TrustAnchorBootstrap::new(
        fetcher,
        h.exchange.clone(),
        PinnedRoot::from_pem(&ca.pem()).unwrap(),
    )
    .with_urls(ANCHORS_URL, SIGNATURE_URL)
    .with_verifier(verifier())
    .at_time(now())
    .root_keys()
    .await
    .unwrap();

    let resolver = ChainResolver::builder()
        .trust_anchors(root_keys)
        .exchange(h.exchange.clone())
        .verifier(verifier())
        .build()
        .unwrap();
    let resolution = resolver
        .resolve("www.example.", DNSResourceType::A)
        .await
        .unwrap();
    assert!(resolution.is_secure());
}
