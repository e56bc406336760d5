//! End-to-end tests: keys drawn from a running pool are issued into a chain
//! that OpenSSL verifies, and the exports round-trip through PKCS#12.

use std::time::Duration as StdDuration;

use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Ref, X509StoreContext, X509};
use pki_devcert::certificate_issuer::issue_chain;
use pki_devcert::error::PoolError;
use pki_devcert::export;
use pki_devcert::key_pool::{KeyPool, PoolConfig};
use pki_devcert::quickstart;
use pki_devcert::serial_number::SerialNumber;
use time::{Duration, OffsetDateTime};

fn small_pool_config() -> PoolConfig {
    PoolConfig {
        key_bits: 1024,
        workers: 2,
        capacity: 4,
        ..PoolConfig::default()
    }
}

fn verify_chain(ca: &X509Ref, leaf: &X509Ref) -> bool {
    let mut builder = X509StoreBuilder::new().unwrap();
    builder.add_cert(ca.to_owned()).unwrap();
    let store = builder.build();

    let chain: Stack<X509> = Stack::new().unwrap();
    let mut context = X509StoreContext::new().unwrap();
    context
        .init(&store, leaf, &chain, |c| c.verify_cert())
        .unwrap()
}

#[test]
fn test_pool_keys_issue_verifiable_chain() {
    let pool = KeyPool::new();
    pool.start(small_pool_config()).unwrap();

    let issuer_key = pool.get_timeout(StdDuration::from_secs(60)).unwrap();
    let leaf_key = pool.get_timeout(StdDuration::from_secs(60)).unwrap();
    assert_ne!(issuer_key.modulus(), leaf_key.modulus());

    let now = OffsetDateTime::now_utc();
    let bundle = issue_chain(
        issuer_key,
        leaf_key,
        "Integration Issuer",
        "Integration Certificate",
        now - Duration::minutes(1),
        now + Duration::days(30),
        &SerialNumber::random().unwrap(),
    )
    .unwrap();
    pool.stop();

    assert_eq!(bundle.issuer_key_bits, 1024);
    assert_eq!(bundle.leaf_key_bits, 1024);
    assert!(verify_chain(
        &bundle.issuer_certificate,
        &bundle.leaf_certificate
    ));

    let pfx = export::leaf_pkcs12(&bundle).unwrap();
    let parsed = Pkcs12::from_der(&pfx)
        .unwrap()
        .parse2(export::PKCS12_PASSWORD)
        .unwrap();
    let ca = parsed.ca.unwrap();
    assert!(verify_chain(ca.get(0).unwrap(), &parsed.cert.unwrap()));

    let md = quickstart::render(&bundle).unwrap();
    assert!(md.contains("| Issuer Name | Integration Issuer |"));
}

#[test]
fn test_stopped_pool_drains_then_refuses() {
    let pool = KeyPool::new();
    pool.start(small_pool_config()).unwrap();
    pool.get_timeout(StdDuration::from_secs(60)).unwrap();
    pool.stop();

    while !pool.is_empty() {
        pool.get().unwrap();
    }
    assert_eq!(pool.get().unwrap_err(), PoolError::NotRunning);
    assert_eq!(
        pool.start(small_pool_config()).unwrap_err(),
        PoolError::AlreadyRunning
    );
}
