//! Two-level certificate chain issuance.
//!
//! Builds a self-signed CA certificate and a leaf certificate signed by it,
//! from key pairs the caller already holds (normally taken from the
//! [`KeyPool`](crate::key_pool::KeyPool)).
//!
//! # Chain
//! ```text
//! CA (self-signed, CA=true, pathlen=0)
//!   └── Leaf (signed by CA, CA=false, EKU time stamping)
//! ```
//!
//! # Certificate Properties
//! - **Version**: X.509v3
//! - **Signature Algorithm**: SHA-256 with RSA (PKCS#1 v1.5)
//! - **Subject**: `CN=<name>`
//! - **Serial Number**: caller supplied, identical on both certificates
//! - **Validity**: caller supplied, identical on both certificates, whole seconds
//!
//! Issuance is pure CPU work. No randomness is drawn, so the same inputs
//! always produce byte-identical certificates.

use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameRef, X509Ref, X509};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

use crate::bundle::CertificateBundle;
use crate::error::{IssueError, IssueResult};
use crate::key_pair::KeyPair;
use crate::serial_number::SerialNumber;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const CA_PATH_LENGTH: u32 = 0; // CA may only sign end-entity certs

/// Extended key usage OID placed on every leaf (id-kp-timeStamping).
pub const LEAF_EXTENDED_KEY_USAGE_OID: &str = "1.3.6.1.5.5.7.3.8";

const X509_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]Z");

/// Issue a CA certificate and a leaf certificate signed by it.
///
/// # Arguments
/// * `issuer_key` - Key pair of the CA; signs both certificates
/// * `leaf_key` - Key pair certified by the leaf certificate
/// * `issuer_name` - Common name of the CA
/// * `leaf_name` - Common name of the leaf
/// * `not_before` / `not_after` - Validity window applied verbatim to both certificates
/// * `serial` - Serial number applied to both certificates
///
/// # Errors
/// * [`IssueError::KeyImport`] if either key is not a consistent RSA key; no
///   certificate is built in that case
/// * [`IssueError::CertificateConstruction`] if the validity window is
///   inverted or any OpenSSL step fails
pub fn issue_chain(
    issuer_key: KeyPair,
    leaf_key: KeyPair,
    issuer_name: &str,
    leaf_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    serial: &SerialNumber,
) -> IssueResult<CertificateBundle> {
    issuer_key.validate()?;
    leaf_key.validate()?;

    if not_after < not_before {
        return Err(IssueError::CertificateConstruction(format!(
            "validity window ends ({}) before it starts ({})",
            not_after, not_before
        )));
    }

    let issuer_certificate = build_ca_certificate(
        &issuer_key,
        issuer_name,
        not_before,
        not_after,
        serial,
    )?;
    let leaf_certificate = build_leaf_certificate(
        &leaf_key,
        leaf_name,
        &issuer_key,
        &issuer_certificate,
        not_before,
        not_after,
        serial,
    )?;

    info!(
        issuer = issuer_name,
        leaf = leaf_name,
        serial = %serial,
        "issued certificate chain"
    );

    Ok(CertificateBundle {
        issuer_key_bits: issuer_key.bits(),
        leaf_key_bits: leaf_key.bits(),
        issuer_key,
        leaf_key,
        issuer_certificate,
        leaf_certificate,
    })
}

/// Convert a timestamp to the ASN.1 time OpenSSL writes into certificates.
///
/// Sub-second precision is dropped; X.509 has none.
pub fn to_asn1_time(t: OffsetDateTime) -> IssueResult<Asn1Time> {
    let formatted = t
        .to_offset(UtcOffset::UTC)
        .format(X509_TIME_FORMAT)
        .map_err(|e| IssueError::construct("failed to format validity time", e))?;
    Asn1Time::from_str_x509(&formatted)
        .map_err(|e| IssueError::construct("failed to create validity time", e))
}

fn common_name(name: &str) -> IssueResult<X509Name> {
    let mut name_builder = X509Name::builder()
        .map_err(|e| IssueError::construct("failed to create name builder", e))?;
    name_builder
        .append_entry_by_nid(Nid::COMMONNAME, name)
        .map_err(|e| IssueError::construct("failed to set CN", e))?;
    Ok(name_builder.build())
}

/// Version, serial, subject, issuer, validity and public key shared by both certificates.
fn base_builder(
    subject_key: &KeyPair,
    subject: &X509NameRef,
    issuer: &X509NameRef,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    serial: &SerialNumber,
) -> IssueResult<X509Builder> {
    let mut builder =
        X509::builder().map_err(|e| IssueError::construct("failed to create X509 builder", e))?;

    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| IssueError::construct("failed to set version", e))?;

    let asn1_serial = serial.to_asn1_integer()?;
    builder
        .set_serial_number(&asn1_serial)
        .map_err(|e| IssueError::construct("failed to set serial number", e))?;

    builder
        .set_subject_name(subject)
        .map_err(|e| IssueError::construct("failed to set subject", e))?;
    builder
        .set_issuer_name(issuer)
        .map_err(|e| IssueError::construct("failed to set issuer", e))?;

    let not_before = to_asn1_time(not_before)?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| IssueError::construct("failed to set not_before", e))?;
    let not_after = to_asn1_time(not_after)?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| IssueError::construct("failed to set not_after", e))?;

    builder
        .set_pubkey(subject_key.private_key())
        .map_err(|e| IssueError::construct("failed to set public key", e))?;

    Ok(builder)
}

fn build_ca_certificate(
    issuer_key: &KeyPair,
    issuer_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    serial: &SerialNumber,
) -> IssueResult<X509> {
    let name = common_name(issuer_name)?;
    let mut builder = base_builder(issuer_key, &name, &name, not_before, not_after, serial)?;

    let bc = BasicConstraints::new()
        .critical()
        .ca()
        .pathlen(CA_PATH_LENGTH)
        .build()
        .map_err(|e| IssueError::construct("failed to build BasicConstraints", e))?;
    builder
        .append_extension(bc)
        .map_err(|e| IssueError::construct("failed to add BasicConstraints", e))?;

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .map_err(|e| IssueError::construct("failed to build SubjectKeyIdentifier", e))?;
    builder
        .append_extension(ski)
        .map_err(|e| IssueError::construct("failed to add SubjectKeyIdentifier", e))?;

    builder
        .sign(issuer_key.private_key(), MessageDigest::sha256())
        .map_err(|e| IssueError::construct("failed to sign CA certificate", e))?;

    Ok(builder.build())
}

fn build_leaf_certificate(
    leaf_key: &KeyPair,
    leaf_name: &str,
    issuer_key: &KeyPair,
    issuer_certificate: &X509Ref,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    serial: &SerialNumber,
) -> IssueResult<X509> {
    let name = common_name(leaf_name)?;
    let mut builder = base_builder(
        leaf_key,
        &name,
        issuer_certificate.subject_name(),
        not_before,
        not_after,
        serial,
    )?;

    // No .ca() call - this is an end-entity certificate
    let bc = BasicConstraints::new()
        .build()
        .map_err(|e| IssueError::construct("failed to build BasicConstraints", e))?;
    builder
        .append_extension(bc)
        .map_err(|e| IssueError::construct("failed to add BasicConstraints", e))?;

    let ku = KeyUsage::new()
        .digital_signature()
        .non_repudiation()
        .build()
        .map_err(|e| IssueError::construct("failed to build KeyUsage", e))?;
    builder
        .append_extension(ku)
        .map_err(|e| IssueError::construct("failed to add KeyUsage", e))?;

    let eku = ExtendedKeyUsage::new()
        .critical()
        .other(LEAF_EXTENDED_KEY_USAGE_OID)
        .build()
        .map_err(|e| IssueError::construct("failed to build ExtendedKeyUsage", e))?;
    builder
        .append_extension(eku)
        .map_err(|e| IssueError::construct("failed to add ExtendedKeyUsage", e))?;

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(Some(issuer_certificate), None))
        .map_err(|e| IssueError::construct("failed to build SubjectKeyIdentifier", e))?;
    builder
        .append_extension(ski)
        .map_err(|e| IssueError::construct("failed to add SubjectKeyIdentifier", e))?;

    // Sign with the CA's private key
    builder
        .sign(issuer_key.private_key(), MessageDigest::sha256())
        .map_err(|e| IssueError::construct("failed to sign leaf certificate", e))?;

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::pkey::PKey;
    use openssl::x509::X509VerifyResult;
    use std::cmp::Ordering;
    use time::macros::datetime;
    use time::Duration;

    const T: OffsetDateTime = datetime!(2026-01-01 12:00:00 UTC);

    fn fixed_serial() -> SerialNumber {
        SerialNumber::from_bytes(&[
            0x3a, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13,
        ])
        .unwrap()
    }

    fn keys() -> (KeyPair, KeyPair) {
        (
            KeyPair::generate(1024).unwrap(),
            KeyPair::generate(1024).unwrap(),
        )
    }

    fn issue(issuer: KeyPair, leaf: KeyPair) -> CertificateBundle {
        issue_chain(
            issuer,
            leaf,
            "Test CA",
            "Test Leaf",
            T,
            T + Duration::days(1),
            &fixed_serial(),
        )
        .unwrap()
    }

    fn same_time(actual: &openssl::asn1::Asn1TimeRef, expected: OffsetDateTime) -> bool {
        actual.compare(&to_asn1_time(expected).unwrap()).unwrap() == Ordering::Equal
    }

    #[test]
    fn test_chain_names_serial_and_validity() {
        let (issuer, leaf) = keys();
        let bundle = issue(issuer, leaf);
        let ca = &bundle.issuer_certificate;
        let cert = &bundle.leaf_certificate;

        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            ca.subject_name().to_der().unwrap()
        );
        assert_eq!(
            ca.issuer_name().to_der().unwrap(),
            ca.subject_name().to_der().unwrap()
        );
        assert_eq!(bundle.issuer_common_name(), "Test CA");
        assert_eq!(bundle.leaf_common_name(), "Test Leaf");

        let serial = cert.serial_number().to_bn().unwrap().to_vec();
        assert_eq!(serial, fixed_serial().as_bytes());

        for c in [ca, cert] {
            assert!(same_time(c.not_before(), T));
            assert!(same_time(c.not_after(), T + Duration::days(1)));
        }
    }

    #[test]
    fn test_signatures_verify() {
        let (issuer, leaf) = keys();
        let bundle = issue(issuer, leaf);
        let ca_public = bundle.issuer_certificate.public_key().unwrap();

        assert!(bundle.issuer_certificate.verify(&ca_public).unwrap());
        assert!(bundle.leaf_certificate.verify(&ca_public).unwrap());
        assert_eq!(
            bundle.issuer_certificate.issued(&bundle.leaf_certificate),
            X509VerifyResult::OK
        );

        let leaf_public = bundle.leaf_certificate.public_key().unwrap();
        assert!(!bundle.leaf_certificate.verify(&leaf_public).unwrap());
    }

    #[test]
    fn test_extensions() {
        let (issuer, leaf) = keys();
        let bundle = issue(issuer, leaf);

        let ca_text = String::from_utf8(bundle.issuer_certificate.to_text().unwrap()).unwrap();
        assert!(ca_text.contains("CA:TRUE, pathlen:0"));
        assert!(ca_text.contains("X509v3 Basic Constraints: critical"));
        assert!(ca_text.contains("X509v3 Subject Key Identifier"));
        assert!(ca_text.contains("sha256WithRSAEncryption"));

        let leaf_text = String::from_utf8(bundle.leaf_certificate.to_text().unwrap()).unwrap();
        assert!(leaf_text.contains("CA:FALSE"));
        assert!(leaf_text.contains("Digital Signature, Non Repudiation"));
        assert!(leaf_text.contains("X509v3 Extended Key Usage: critical"));
        assert!(leaf_text.contains("Time Stamping"));
        assert!(leaf_text.contains("X509v3 Subject Key Identifier"));

        assert!(bundle.issuer_certificate.subject_key_id().is_some());
        assert_ne!(
            bundle.issuer_certificate.subject_key_id().unwrap().as_slice(),
            bundle.leaf_certificate.subject_key_id().unwrap().as_slice()
        );
    }

    #[test]
    fn test_records_actual_key_sizes() {
        let issuer = KeyPair::generate(1024).unwrap();
        let leaf = KeyPair::generate(1536).unwrap();
        let bundle = issue(issuer, leaf);
        assert_eq!(bundle.issuer_key_bits, 1024);
        assert_eq!(bundle.leaf_key_bits, 1536);
    }

    #[test]
    fn test_issuance_is_deterministic() {
        let (issuer, leaf) = keys();
        let first = issue(issuer.clone(), leaf.clone());
        let second = issue(issuer, leaf);

        assert_eq!(
            first.issuer_certificate.to_der().unwrap(),
            second.issuer_certificate.to_der().unwrap()
        );
        assert_eq!(
            first.leaf_certificate.to_der().unwrap(),
            second.leaf_certificate.to_der().unwrap()
        );
    }

    #[test]
    fn test_inverted_validity_rejected() {
        let (issuer, leaf) = keys();
        let result = issue_chain(
            issuer,
            leaf,
            "Test CA",
            "Test Leaf",
            T,
            T - Duration::seconds(1),
            &fixed_serial(),
        );
        assert!(matches!(result, Err(IssueError::CertificateConstruction(_))));
    }

    #[test]
    fn test_non_rsa_key_is_import_error() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let (issuer, _) = keys();

        let result = issue_chain(
            issuer,
            KeyPair::unchecked(ec),
            "Test CA",
            "Test Leaf",
            T,
            T + Duration::days(1),
            &fixed_serial(),
        );
        assert!(matches!(result, Err(IssueError::KeyImport(_))));
    }

    #[test]
    fn test_subsecond_precision_dropped() {
        let precise = T + Duration::milliseconds(750);
        assert!(same_time(&to_asn1_time(precise).unwrap(), T));
    }
}
