//! The output of a chain issuance.

use openssl::nid::Nid;
use openssl::x509::{X509Ref, X509};

use crate::key_pair::KeyPair;

/// Both key pairs and both certificates of a freshly issued chain.
///
/// The bundle owns everything; nothing is shared with the pool or the issuer.
/// Key sizes are read from the keys themselves, so they reflect what was
/// actually generated rather than what was asked for.
#[derive(Debug)]
pub struct CertificateBundle {
    pub issuer_key: KeyPair,
    pub leaf_key: KeyPair,
    /// Self-signed CA certificate.
    pub issuer_certificate: X509,
    /// End-entity certificate signed by `issuer_certificate`.
    pub leaf_certificate: X509,
    pub issuer_key_bits: u32,
    pub leaf_key_bits: u32,
}

impl CertificateBundle {
    /// Common name of the CA certificate's subject.
    pub fn issuer_common_name(&self) -> String {
        common_name(&self.issuer_certificate)
    }

    /// Common name of the leaf certificate's subject.
    pub fn leaf_common_name(&self) -> String {
        common_name(&self.leaf_certificate)
    }
}

pub(crate) fn common_name(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .map(|entry| String::from_utf8_lossy(entry.data().as_slice()).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate_issuer::issue_chain;
    use crate::serial_number::SerialNumber;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn test_common_names_read_back() {
        let start = datetime!(2026-01-01 00:00:00 UTC);
        let bundle = issue_chain(
            KeyPair::generate(1024).unwrap(),
            KeyPair::generate(1024).unwrap(),
            "Entwicklungs-Aussteller Ü",
            "plain leaf",
            start,
            start + Duration::days(1),
            &SerialNumber::from_bytes(&[7]).unwrap(),
        )
        .unwrap();

        assert_eq!(bundle.issuer_common_name(), "Entwicklungs-Aussteller Ü");
        assert_eq!(bundle.leaf_common_name(), "plain leaf");
    }
}
