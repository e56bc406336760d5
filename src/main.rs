//! pki-devcert - development certificate generator
//!
//! Issues a throwaway CA and a leaf certificate signed by it, then writes the
//! raw exports and a Markdown quickstart into a fresh random directory:
//!
//! ```text
//! <out>/<random hex>/
//!   quickstart.md
//!   raw/issuer_key.pem
//!   raw/certificate_key.pem
//!   raw/issuer_certificate.cer
//!   raw/certificate.pfx
//! ```
//!
//! Settings come from `config.toml` (or `--config`); command line flags win.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pki_devcert::certificate_issuer::issue_chain;
use pki_devcert::configs::AppConfig;
use pki_devcert::export;
use pki_devcert::generation_log::GenerationLog;
use pki_devcert::key_pool::KeyPool;
use pki_devcert::quickstart;
use pki_devcert::serial_number::SerialNumber;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const OUTPUT_DIR_ID_BYTES: usize = 16;
/// A single run needs two keys; more workers only add generations nobody takes.
const ONE_SHOT_MAX_WORKERS: usize = 2;
/// Last year an X.509 GeneralizedTime can carry.
const MAX_VALIDITY_YEAR: i32 = 9999;

/// Generate a short-lived development CA and certificate.
#[derive(Parser, Debug)]
#[command(name = "pki-devcert")]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Common name of the issuing CA.
    #[arg(long)]
    issuer: Option<String>,

    /// Common name of the leaf certificate.
    #[arg(long)]
    name: Option<String>,

    /// Directory the generated bundle directory is created in.
    #[arg(short = 'o', long)]
    out: Option<PathBuf>,

    #[arg(long)]
    validity_days: Option<u32>,

    /// RSA key size used for both keys.
    #[arg(long)]
    key_bits: Option<u32>,

    /// Number of key generation threads.
    #[arg(long)]
    workers: Option<usize>,
}

impl Args {
    /// Overlay the command line on top of the file configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(issuer) = non_blank(&self.issuer) {
            config.issuance.issuer_name = issuer;
        }
        if let Some(name) = non_blank(&self.name) {
            config.issuance.certificate_name = name;
        }
        if let Some(out) = &self.out {
            config.output.directory = out.clone();
        }
        if let Some(days) = self.validity_days {
            config.issuance.validity_days = days;
        }
        if let Some(bits) = self.key_bits {
            config.pool.key_bits = bits;
        }
        match self.workers {
            Some(workers) => config.pool.workers = workers,
            None => config.pool.workers = config.pool.workers.min(ONE_SHOT_MAX_WORKERS),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    args.apply(&mut config);

    let output_dir = generate(&config)?;
    println!("✓ Certificates written to {}", output_dir.display());
    Ok(())
}

/// Run one full generation and return the directory it was written to.
fn generate(config: &AppConfig) -> Result<PathBuf> {
    let mut log = GenerationLog::new();
    let (not_before, not_after) =
        validity_window(OffsetDateTime::now_utc(), config.issuance.validity_days)?;

    let pool = KeyPool::new();
    pool.start(config.pool_config())
        .context("Failed to start key pool")?;
    log.log(format!(
        "Started key pool ({} bit keys, {} workers)",
        config.pool.key_bits, config.pool.workers
    ));

    let issuer_key = pool.get().context("Failed to get issuer key")?;
    log.log("Issuer key acquired");
    let leaf_key = pool.get().context("Failed to get certificate key")?;
    log.log("Certificate key acquired");
    pool.stop();

    let serial = SerialNumber::random().context("Failed to generate serial number")?;
    let bundle = issue_chain(
        issuer_key,
        leaf_key,
        &config.issuance.issuer_name,
        &config.issuance.certificate_name,
        not_before,
        not_after,
        &serial,
    )
    .context("Failed to issue certificate chain")?;
    log.log(format!("Issued certificate chain with serial {}", serial));

    let output_dir = new_output_dir(&config.output.directory)?;
    export::write_raw(&bundle, &output_dir.join("raw"))?;
    log.log("Raw exports written");

    let mut document = quickstart::render(&bundle)?;
    log.log("Quickstart rendered");
    log.finish();
    document.push('\n');
    document.push_str(&log.to_markdown());

    export::write_new(
        &output_dir.join(quickstart::QUICKSTART_FILE),
        document.as_bytes(),
    )?;

    Ok(output_dir)
}

/// Validity from `now` for `days` days. Zero days and windows past what a
/// certificate can express are rejected.
fn validity_window(now: OffsetDateTime, days: u32) -> Result<(OffsetDateTime, OffsetDateTime)> {
    if days == 0 {
        return Err(anyhow!("validity_days must be at least 1"));
    }
    let not_after = now
        .checked_add(Duration::days(i64::from(days)))
        .filter(|end| end.year() <= MAX_VALIDITY_YEAR)
        .ok_or_else(|| anyhow!("validity_days too large: {}", days))?;
    Ok((now, not_after))
}

fn new_output_dir(base: &Path) -> Result<PathBuf> {
    let mut id = [0u8; OUTPUT_DIR_ID_BYTES];
    openssl::rand::rand_bytes(&mut id)
        .map_err(|e| anyhow!("Failed to generate output directory name: {}", e))?;
    let dir = base.join(hex::encode(id));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-06-01 09:30:00 UTC);

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["pki-devcert"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_validity_window_spans_requested_days() {
        let (start, end) = validity_window(NOW, 30).unwrap();
        assert_eq!(start, NOW);
        assert_eq!(end, datetime!(2026-07-01 09:30:00 UTC));
    }

    #[test]
    fn test_validity_window_rejects_zero_and_oversized() {
        assert!(validity_window(NOW, 0).is_err());

        let err = validity_window(NOW, 4_000_000).unwrap_err();
        assert!(err.to_string().contains("validity_days too large"));
        assert!(validity_window(NOW, u32::MAX).is_err());
    }

    #[test]
    fn test_workers_capped_unless_given() {
        let mut config = AppConfig::default();
        config.pool.workers = 16;
        args(&[]).apply(&mut config);
        assert_eq!(config.pool.workers, ONE_SHOT_MAX_WORKERS);

        let mut config = AppConfig::default();
        config.pool.workers = 1;
        args(&[]).apply(&mut config);
        assert_eq!(config.pool.workers, 1);

        let mut config = AppConfig::default();
        args(&["--workers", "8"]).apply(&mut config);
        assert_eq!(config.pool.workers, 8);
    }

    #[test]
    fn test_blank_names_keep_configured_defaults() {
        let mut config = AppConfig::default();
        args(&["--issuer", "  ", "--name", "Local Dev"]).apply(&mut config);
        assert_eq!(config.issuance.issuer_name, "Unnamed Issuer");
        assert_eq!(config.issuance.certificate_name, "Local Dev");
    }
}
