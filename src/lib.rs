//! pki-devcert - Development Certificate Chain Library
//!
//! Issues short-lived two-level certificate chains for development: a
//! self-signed CA and a single end-entity certificate signed by it. RSA key
//! generation is the slow part, so keys come from a background pool that keeps
//! a bounded supply of fresh key pairs ready.
//!
//! ```text
//! Issuer CA (self-signed, CA=true, pathlen=0)
//!   └── Certificate (signed by Issuer, CA=false, EKU time stamping)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pki_devcert::certificate_issuer::issue_chain;
//! use pki_devcert::key_pool::{KeyPool, PoolConfig};
//! use pki_devcert::serial_number::SerialNumber;
//! use time::{Duration, OffsetDateTime};
//!
//! fn main() -> anyhow::Result<()> {
//!     let pool = KeyPool::new();
//!     pool.start(PoolConfig::default())?;
//!
//!     let now = OffsetDateTime::now_utc();
//!     let bundle = issue_chain(
//!         pool.get()?,
//!         pool.get()?,
//!         "Dev Issuer",
//!         "Dev Certificate",
//!         now,
//!         now + Duration::days(30),
//!         &SerialNumber::random()?,
//!     )?;
//!     println!("{}", bundle.leaf_common_name());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`key_pool`]: worker threads and the blocking `get`
//! - [`key_pair`]: RSA key pairs, import paths and the [`key_pair::KeyGenerator`] seam
//! - [`certificate_issuer`]: CA and leaf construction
//! - [`bundle`]: the issued keys and certificates
//! - [`export`] / [`quickstart`]: PKCS#12, DER, PEM and the Markdown quickstart
//! - [`generation_log`]: per-request progress log
//! - [`configs`]: TOML configuration
//!
//! # Error Handling
//!
//! Pool and issuance errors are typed ([`error::PoolError`],
//! [`error::IssueError`]). Export, rendering and configuration return
//! `anyhow::Result<T>`.

pub mod bundle;
pub mod certificate_issuer;
pub mod configs;
pub mod error;
pub mod export;
pub mod generation_log;
pub mod key_pair;
pub mod key_pool;
mod key_queue;
pub mod quickstart;
pub mod serial_number;
