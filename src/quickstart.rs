//! Markdown quickstart document for a freshly issued chain.
//!
//! The document tells the operator how to install the leaf archive on the
//! server, how to make clients trust the CA, and lists every property of both
//! certificates together with the PEM encoded keys that were used.

use std::fmt::Write;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::x509::X509Ref;

use crate::bundle::CertificateBundle;
use crate::export;

pub const QUICKSTART_FILE: &str = "quickstart.md";

/// Render the quickstart for `bundle`.
pub fn render(bundle: &CertificateBundle) -> Result<String> {
    let pfx = STANDARD.encode(export::leaf_pkcs12(bundle)?);
    let ca_der = STANDARD.encode(export::issuer_certificate_der(bundle)?);
    let days = validity_days(&bundle.leaf_certificate)?;

    let mut md = String::new();
    let _ = writeln!(
        md,
        "*ONLY USE SELF SIGNED CERTIFICATES INTERNALLY OR FOR TESTING. USE A PUBLIC CERTIFICATE \
         AUTHORITY FOR REAL CERTIFICATES. THIS DOCUMENT DESCRIBES A CERTIFICATE AUTHORITY KEY PAIR \
         AND A CERTIFICATE SIGNED BY THAT AUTHORITY. CERTIFICATES ARE ONLY VALID FOR {} DAYS. AFTER \
         THAT TIME YOU NEED A NEW ISSUER AND CERTIFICATE.*",
        days
    );
    md.push('\n');

    md.push_str("# Overview\n\n");

    md.push_str("## Server instructions\n");
    md.push_str("**IMPORTANT:** *ONLY DO THIS STEP ON THE SERVER. IT SHOULD NOT BE DONE ON CLIENTS*\n\n");
    md.push_str(
        "The server presents the certificate below. It is a base64 encoded PKCS#12 archive with \
         an empty password containing the certificate, its private key and the issuer certificate:\n",
    );
    md.push_str("```\n");
    md.push_str(&pfx);
    md.push_str("\n```\n");
    md.push_str("To write it back to disk:\n");
    md.push_str("```sh\n");
    md.push_str("base64 -d > certificate.pfx <<'EOF'\n");
    md.push_str(&pfx);
    md.push_str("\nEOF\n```\n\n");

    md.push_str("## Client instructions\n");
    md.push_str(
        "To make clients trust your certificate issuer, add the following base64 encoded DER \
         certificate to their trust store before connecting:\n",
    );
    md.push_str("```\n");
    md.push_str(&ca_der);
    md.push_str("\n```\n");
    md.push_str("A presented certificate is accepted when it chains to this issuer:\n");
    md.push_str("```sh\n");
    let _ = writeln!(md, "base64 -d <<'EOF' | openssl x509 -inform DER -out issuer.pem\n{}\nEOF", ca_der);
    md.push_str("openssl verify -CAfile issuer.pem presented.pem\n");
    md.push_str("```\n\n");

    md.push_str("# Advanced\n");
    md.push_str("| Property | Value |\n");
    md.push_str("|----------------------------|--------------|\n");
    let issuer = &bundle.issuer_certificate;
    let leaf = &bundle.leaf_certificate;
    row(&mut md, "Issuer Name", &bundle.issuer_common_name());
    row(&mut md, "Issuer Key Type", "RSA");
    row(&mut md, "Issuer Key Size", &bundle.issuer_key_bits.to_string());
    row(&mut md, "Issuer Validity Start", &issuer.not_before().to_string());
    row(&mut md, "Issuer Validity End", &issuer.not_after().to_string());
    row(&mut md, "Issuer Serial Number", &export::serial_hex(issuer)?);
    row(&mut md, "Issuer Thumbprint", &export::thumbprint(issuer)?);
    row(&mut md, "Certificate Name", &bundle.leaf_common_name());
    row(&mut md, "Certificate Serial Number", &export::serial_hex(leaf)?);
    row(&mut md, "Certificate Thumbprint", &export::thumbprint(leaf)?);
    row(&mut md, "Certificate Key Type", "RSA");
    row(&mut md, "Certificate Key Size", &bundle.leaf_key_bits.to_string());
    row(&mut md, "Certificate Validity Start", &leaf.not_before().to_string());
    row(&mut md, "Certificate Validity End", &leaf.not_after().to_string());
    md.push('\n');

    md.push_str("## Keys\n");
    md.push_str("These are the keys that were used\n");
    md.push_str("### Issuer Public/Private Key\n");
    pem_block(&mut md, &export::key_pem(&bundle.issuer_key)?)?;
    md.push_str("### Certificate Public/Private Key\n");
    pem_block(&mut md, &export::key_pem(&bundle.leaf_key)?)?;

    Ok(md)
}

fn row(md: &mut String, property: &str, value: &str) {
    let _ = writeln!(md, "| {} | {} |", property, value);
}

fn pem_block(md: &mut String, pem: &[u8]) -> Result<()> {
    let pem = std::str::from_utf8(pem).map_err(|e| anyhow!("PEM is not valid UTF-8: {}", e))?;
    md.push_str("```\n");
    md.push_str(pem.trim_end());
    md.push_str("\n```\n");
    Ok(())
}

fn validity_days(cert: &X509Ref) -> Result<i32> {
    let diff = cert
        .not_before()
        .diff(cert.not_after())
        .map_err(|e| anyhow!("Failed to compute validity period: {}", e))?;
    Ok(diff.days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate_issuer::issue_chain;
    use crate::key_pair::KeyPair;
    use crate::serial_number::SerialNumber;
    use openssl::pkcs12::Pkcs12;
    use openssl::x509::X509;
    use time::{Duration, OffsetDateTime};

    fn bundle() -> CertificateBundle {
        let now = OffsetDateTime::now_utc();
        issue_chain(
            KeyPair::generate(1024).unwrap(),
            KeyPair::generate(1024).unwrap(),
            "Quickstart CA",
            "Quickstart Leaf",
            now,
            now + Duration::days(30),
            &SerialNumber::random().unwrap(),
        )
        .unwrap()
    }

    fn fenced_after<'a>(md: &'a str, heading: &str) -> &'a str {
        let section = &md[md.find(heading).unwrap()..];
        let start = section.find("```\n").unwrap() + 4;
        let end = start + section[start..].find("\n```").unwrap();
        &section[start..end]
    }

    #[test]
    fn test_embedded_exports_decode() {
        let bundle = bundle();
        let md = render(&bundle).unwrap();

        let pfx = STANDARD.decode(fenced_after(&md, "## Server instructions")).unwrap();
        let parsed = Pkcs12::from_der(&pfx)
            .unwrap()
            .parse2(export::PKCS12_PASSWORD)
            .unwrap();
        assert_eq!(
            parsed.cert.unwrap().to_der().unwrap(),
            bundle.leaf_certificate.to_der().unwrap()
        );

        let ca = STANDARD.decode(fenced_after(&md, "## Client instructions")).unwrap();
        assert_eq!(
            X509::from_der(&ca).unwrap().to_der().unwrap(),
            bundle.issuer_certificate.to_der().unwrap()
        );
    }

    #[test]
    fn test_advanced_table_reports_actual_values() {
        let bundle = bundle();
        let md = render(&bundle).unwrap();

        assert!(md.contains("CERTIFICATES ARE ONLY VALID FOR 30 DAYS"));
        assert!(md.contains("| Issuer Name | Quickstart CA |"));
        assert!(md.contains("| Certificate Name | Quickstart Leaf |"));
        assert!(md.contains("| Issuer Key Size | 1024 |"));
        assert!(md.contains("| Certificate Key Size | 1024 |"));
        let print = export::thumbprint(&bundle.leaf_certificate).unwrap();
        assert!(md.contains(&format!("| Certificate Thumbprint | {} |", print)));
        assert_eq!(md.matches("BEGIN PRIVATE KEY").count(), 2);
    }
}
