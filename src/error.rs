//! Error types for the key pool and certificate issuance.
//!
//! Pool failures and issuance failures are kept apart: a caller of
//! [`KeyPool::get`](crate::key_pool::KeyPool::get) never sees a key
//! generation error, and a caller of
//! [`issue_chain`](crate::certificate_issuer::issue_chain) never sees a pool
//! lifecycle error.

use openssl::error::ErrorStack;

/// Result alias for key pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Result alias for certificate issuance.
pub type IssueResult<T> = Result<T, IssueError>;

/// Lifecycle and configuration failures of a [`KeyPool`](crate::key_pool::KeyPool).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// `start` was called on a pool that has already been started.
    #[error("key pool has already been started")]
    AlreadyRunning,
    /// The pool configuration can never produce keys.
    #[error("invalid key pool configuration: {0}")]
    InvalidConfiguration(String),
    /// The pool is empty and no worker is running to refill it.
    #[error("key pool is not running and has no keys left")]
    NotRunning,
    /// A worker thread could not be spawned.
    #[error("failed to spawn key pool worker: {0}")]
    WorkerSpawn(String),
    /// A bounded wait elapsed before a key became available.
    #[error("timed out waiting for a pooled key")]
    Timeout,
}

/// A single failed key generation attempt.
///
/// Workers log and retry these; they never escape the pool.
#[derive(Debug, thiserror::Error)]
pub enum KeyGenError {
    #[error("failed to generate RSA key pair: {0}")]
    Openssl(#[from] ErrorStack),
    /// Raised by non-OpenSSL generators.
    #[error("key generator failed: {0}")]
    Generator(String),
}

/// Failures while importing key material or building a certificate chain.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// Key material is malformed, inconsistent or of the wrong family.
    #[error("failed to import key: {0}")]
    KeyImport(String),
    /// A certificate could not be assembled or signed.
    #[error("failed to construct certificate: {0}")]
    CertificateConstruction(String),
}

impl IssueError {
    pub(crate) fn import(step: &str, err: impl std::fmt::Display) -> Self {
        IssueError::KeyImport(format!("{}: {}", step, err))
    }

    pub(crate) fn construct(step: &str, err: impl std::fmt::Display) -> Self {
        IssueError::CertificateConstruction(format!("{}: {}", step, err))
    }
}
