//! RSA key pairs and the generators that produce them.
//!
//! A [`KeyPair`] owns an OpenSSL private key (which carries the public half).
//! Key pairs are handed out by the [`KeyPool`](crate::key_pool::KeyPool) and
//! consumed by [`issue_chain`](crate::certificate_issuer::issue_chain).

use std::fmt;

use openssl::bn::BigNum;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;

use crate::error::{IssueError, IssueResult, KeyGenError};

/// Smallest modulus the pool will agree to generate.
pub const MIN_KEY_BITS: u32 = 1024;
/// Largest modulus the pool will agree to generate.
pub const MAX_KEY_BITS: u32 = 16384;
/// Historical default key size.
pub const DEFAULT_KEY_BITS: u32 = 4096;

/// An RSA public/private key pair.
#[derive(Clone)]
pub struct KeyPair {
    key: PKey<Private>,
}

/// Raw RSA parameters as unsigned big-endian integers.
///
/// Mirrors the usual "key parameters" interchange shape: modulus, exponents,
/// primes and CRT coefficients.
#[derive(Clone, Default)]
pub struct RsaComponents {
    pub modulus: Vec<u8>,
    pub public_exponent: Vec<u8>,
    pub private_exponent: Vec<u8>,
    pub prime1: Vec<u8>,
    pub prime2: Vec<u8>,
    pub exponent1: Vec<u8>,
    pub exponent2: Vec<u8>,
    pub coefficient: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh RSA key pair with a modulus of `bits` bits.
    ///
    /// This is the expensive operation the pool exists to hide.
    pub fn generate(bits: u32) -> Result<Self, KeyGenError> {
        let rsa = Rsa::generate(bits)?;
        let key = PKey::from_rsa(rsa)?;
        Ok(Self { key })
    }

    /// Wrap an existing OpenSSL key after checking it is a consistent RSA key.
    pub fn from_pkey(key: PKey<Private>) -> IssueResult<Self> {
        let pair = Self { key };
        pair.validate()?;
        Ok(pair)
    }

    /// Import a PEM encoded private key (PKCS#8 or traditional RSA).
    pub fn from_pem(pem: &[u8]) -> IssueResult<Self> {
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| IssueError::import("failed to parse private key PEM", e))?;
        Self::from_pkey(key)
    }

    /// Import a PKCS#1 DER encoded RSA private key.
    pub fn from_pkcs1_der(der: &[u8]) -> IssueResult<Self> {
        let rsa = Rsa::private_key_from_der(der)
            .map_err(|e| IssueError::import("failed to parse RSA private key DER", e))?;
        let key = PKey::from_rsa(rsa)
            .map_err(|e| IssueError::import("failed to create private key", e))?;
        Self::from_pkey(key)
    }

    /// Import a key from its raw RSA parameters.
    ///
    /// Any missing component is a key import failure.
    pub fn from_rsa_components(parts: &RsaComponents) -> IssueResult<Self> {
        let field = |name: &str, bytes: &[u8]| -> IssueResult<BigNum> {
            if bytes.is_empty() {
                return Err(IssueError::KeyImport(format!("missing RSA component {}", name)));
            }
            BigNum::from_slice(bytes)
                .map_err(|e| IssueError::import(&format!("invalid RSA component {}", name), e))
        };

        let rsa = Rsa::from_private_components(
            field("modulus", &parts.modulus)?,
            field("public exponent", &parts.public_exponent)?,
            field("private exponent", &parts.private_exponent)?,
            field("prime1", &parts.prime1)?,
            field("prime2", &parts.prime2)?,
            field("exponent1", &parts.exponent1)?,
            field("exponent2", &parts.exponent2)?,
            field("coefficient", &parts.coefficient)?,
        )
        .map_err(|e| IssueError::import("failed to assemble RSA key", e))?;
        let key = PKey::from_rsa(rsa)
            .map_err(|e| IssueError::import("failed to create private key", e))?;
        Self::from_pkey(key)
    }

    /// Export the raw RSA parameters of this key.
    pub fn to_rsa_components(&self) -> IssueResult<RsaComponents> {
        let rsa = self
            .key
            .rsa()
            .map_err(|e| IssueError::import("key is not an RSA key", e))?;
        let missing = || IssueError::KeyImport("key is missing CRT parameters".to_string());

        Ok(RsaComponents {
            modulus: rsa.n().to_vec(),
            public_exponent: rsa.e().to_vec(),
            private_exponent: rsa.d().to_vec(),
            prime1: rsa.p().ok_or_else(missing)?.to_vec(),
            prime2: rsa.q().ok_or_else(missing)?.to_vec(),
            exponent1: rsa.dmp1().ok_or_else(missing)?.to_vec(),
            exponent2: rsa.dmq1().ok_or_else(missing)?.to_vec(),
            coefficient: rsa.iqmp().ok_or_else(missing)?.to_vec(),
        })
    }

    /// Check the key is RSA and that its components agree with each other.
    pub fn validate(&self) -> IssueResult<()> {
        let rsa = self
            .key
            .rsa()
            .map_err(|e| IssueError::import("key is not an RSA key", e))?;
        match rsa.check_key() {
            Ok(true) => Ok(()),
            Ok(false) => Err(IssueError::KeyImport(
                "RSA key components are inconsistent".to_string(),
            )),
            Err(e) => Err(IssueError::import("RSA key check failed", e)),
        }
    }

    /// Wrap a key without any checks, for exercising validation paths.
    #[cfg(test)]
    pub(crate) fn unchecked(key: PKey<Private>) -> Self {
        Self { key }
    }

    /// Actual modulus size in bits.
    pub fn bits(&self) -> u32 {
        self.key.bits()
    }

    /// Big-endian modulus bytes; identifies the key material.
    pub fn modulus(&self) -> Vec<u8> {
        self.key
            .rsa()
            .map(|rsa| rsa.n().to_vec())
            .unwrap_or_default()
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn into_private_key(self) -> PKey<Private> {
        self.key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Source of fresh key pairs for the pool workers.
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate(&self, bits: u32) -> Result<KeyPair, KeyGenError>;
}

/// Generates RSA keys with OpenSSL.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaKeyGenerator;

impl KeyGenerator for RsaKeyGenerator {
    fn generate(&self, bits: u32) -> Result<KeyPair, KeyGenError> {
        KeyPair::generate(bits)
    }
}
