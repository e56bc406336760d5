//! Encodings of a [`CertificateBundle`] for use outside this crate.
//!
//! - **Leaf PKCS#12**: leaf key + leaf certificate + CA certificate, for the server
//! - **CA DER**: the CA certificate alone, for clients to trust
//! - **Key PEM**: PKCS#8 PEM of both key pairs, for archival
//!
//! PKCS#12 archives are written with an empty password; these are throwaway
//! development credentials.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;
use openssl::x509::X509Ref;

use crate::bundle::CertificateBundle;
use crate::key_pair::KeyPair;

/// Password protecting exported PKCS#12 archives.
pub const PKCS12_PASSWORD: &str = "";

pub const ISSUER_KEY_FILE: &str = "issuer_key.pem";
pub const CERTIFICATE_KEY_FILE: &str = "certificate_key.pem";
pub const ISSUER_CERTIFICATE_FILE: &str = "issuer_certificate.cer";
pub const CERTIFICATE_PFX_FILE: &str = "certificate.pfx";

/// Leaf certificate, its private key and the CA certificate as one PKCS#12 archive.
pub fn leaf_pkcs12(bundle: &CertificateBundle) -> Result<Vec<u8>> {
    let mut ca_stack = Stack::new().map_err(|e| anyhow!("Failed to create CA stack: {}", e))?;
    ca_stack
        .push(bundle.issuer_certificate.clone())
        .map_err(|e| anyhow!("Failed to add CA certificate to stack: {}", e))?;

    let pkcs12 = Pkcs12::builder()
        .name(&bundle.leaf_common_name())
        .pkey(bundle.leaf_key.private_key())
        .cert(&bundle.leaf_certificate)
        .ca(ca_stack)
        .build2(PKCS12_PASSWORD)
        .map_err(|e| anyhow!("Failed to build PKCS#12 archive: {}", e))?;

    pkcs12
        .to_der()
        .map_err(|e| anyhow!("Failed to encode PKCS#12 archive: {}", e))
}

/// The CA certificate in DER form.
pub fn issuer_certificate_der(bundle: &CertificateBundle) -> Result<Vec<u8>> {
    bundle
        .issuer_certificate
        .to_der()
        .map_err(|e| anyhow!("Failed to encode CA certificate: {}", e))
}

/// PKCS#8 PEM of a key pair's private key (the public key is derivable from it).
pub fn key_pem(key: &KeyPair) -> Result<Vec<u8>> {
    key.private_key()
        .private_key_to_pem_pkcs8()
        .map_err(|e| anyhow!("Failed to encode private key: {}", e))
}

/// SHA-1 fingerprint as uppercase hex.
pub fn thumbprint(cert: &X509Ref) -> Result<String> {
    let digest = cert
        .digest(MessageDigest::sha1())
        .map_err(|e| anyhow!("Failed to compute thumbprint: {}", e))?;
    Ok(hex::encode_upper(&*digest))
}

/// Serial number as uppercase hex.
pub fn serial_hex(cert: &X509Ref) -> Result<String> {
    let serial = cert
        .serial_number()
        .to_bn()
        .map_err(|e| anyhow!("Failed to read serial number: {}", e))?;
    Ok(hex::encode_upper(serial.to_vec()))
}

/// Paths of the files written by [`write_raw`].
#[derive(Debug, Clone)]
pub struct RawExportPaths {
    pub issuer_key: PathBuf,
    pub certificate_key: PathBuf,
    pub issuer_certificate: PathBuf,
    pub certificate_pfx: PathBuf,
}

/// Write every raw export of `bundle` into `dir`, creating it if needed.
///
/// Existing files are never overwritten.
pub fn write_raw(bundle: &CertificateBundle, dir: &Path) -> Result<RawExportPaths> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let paths = RawExportPaths {
        issuer_key: dir.join(ISSUER_KEY_FILE),
        certificate_key: dir.join(CERTIFICATE_KEY_FILE),
        issuer_certificate: dir.join(ISSUER_CERTIFICATE_FILE),
        certificate_pfx: dir.join(CERTIFICATE_PFX_FILE),
    };

    write_new(&paths.issuer_key, &key_pem(&bundle.issuer_key)?)?;
    write_new(&paths.certificate_key, &key_pem(&bundle.leaf_key)?)?;
    write_new(&paths.issuer_certificate, &issuer_certificate_der(bundle)?)?;
    write_new(&paths.certificate_pfx, &leaf_pkcs12(bundle)?)?;

    Ok(paths)
}

/// Create `path` and write `data`, failing if the file already exists.
pub fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("Failed to write {}", path.display()))
}
