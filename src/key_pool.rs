//! Background RSA key pre-generation pool.
//!
//! RSA key generation at 4096 bits takes long enough to be noticeable on every
//! request. A [`KeyPool`] runs a fixed set of worker threads that keep a
//! bounded FIFO of fresh key pairs warm, so issuing a certificate chain only
//! pays for two queue pops.
//!
//! # Lifecycle
//! ```text
//! Idle --start()--> Running --stop()--> Stopped
//! ```
//! A pool is started at most once. Keys already queued when the pool stops are
//! still served; once the queue drains, [`KeyPool::get`] fails with
//! [`PoolError::NotRunning`] instead of blocking forever.
//!
//! # Example
//! ```rust,no_run
//! use pki_devcert::key_pool::{KeyPool, PoolConfig};
//! # fn example() -> Result<(), pki_devcert::error::PoolError> {
//! let pool = KeyPool::new();
//! pool.start(PoolConfig::default())?;
//! let issuer_key = pool.get()?;
//! let leaf_key = pool.get()?;
//! pool.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};
use crate::key_pair::{
    KeyGenerator, KeyPair, RsaKeyGenerator, DEFAULT_KEY_BITS, MAX_KEY_BITS, MIN_KEY_BITS,
};
use crate::key_queue::{KeyQueue, Rotation};

pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_millis(100);

/// Pool settings, fixed for the lifetime of a started pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// RSA modulus size of every generated key.
    pub key_bits: u32,
    /// Number of producer threads.
    pub workers: usize,
    /// Maximum number of idle keys held.
    pub capacity: usize,
    /// Keys older than this are evicted instead of served.
    pub max_age: Duration,
    /// How often a paused worker wakes up to run rotation.
    pub rotation_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            workers: default_workers(),
            capacity: DEFAULT_CAPACITY,
            max_age: DEFAULT_MAX_AGE,
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
        }
    }
}

/// Available parallelism, or one worker when it cannot be determined.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PoolConfig {
    /// Reject settings under which the pool could never hand out a key.
    pub fn validate(&self) -> PoolResult<()> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.key_bits) || self.key_bits % 8 != 0 {
            return Err(PoolError::InvalidConfiguration(format!(
                "key size {} is not a multiple of 8 between {} and {}",
                self.key_bits, MIN_KEY_BITS, MAX_KEY_BITS
            )));
        }
        if self.workers == 0 {
            return Err(PoolError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfiguration(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.max_age.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "max key age must be non-zero".to_string(),
            ));
        }
        if self.rotation_interval.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "rotation interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Stopped,
}

struct Inner {
    state: PoolState,
    config: Option<PoolConfig>,
    queue: KeyQueue<KeyPair>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Signalled when a key is queued or the pool stops.
    available: Condvar,
    /// Signalled when a key is removed or the pool stops.
    space: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pool of pre-generated RSA key pairs fed by background workers.
pub struct KeyPool {
    shared: Arc<Shared>,
    generator: Arc<dyn KeyGenerator>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for KeyPool {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPool {
    /// Create an idle pool that generates keys with OpenSSL.
    pub fn new() -> Self {
        Self::with_generator(RsaKeyGenerator)
    }

    /// Create an idle pool backed by a custom key source.
    pub fn with_generator<G: KeyGenerator>(generator: G) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: PoolState::Idle,
                    config: None,
                    queue: KeyQueue::new(0, Duration::ZERO),
                }),
                available: Condvar::new(),
                space: Condvar::new(),
            }),
            generator: Arc::new(generator),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Validate `config` and launch the producer threads.
    ///
    /// # Errors
    /// * [`PoolError::AlreadyRunning`] if the pool was started before
    /// * [`PoolError::InvalidConfiguration`] if `config` can never yield keys
    /// * [`PoolError::WorkerSpawn`] if a worker thread could not be created
    pub fn start(&self, config: PoolConfig) -> PoolResult<()> {
        {
            let mut inner = self.shared.lock();
            if inner.state != PoolState::Idle {
                return Err(PoolError::AlreadyRunning);
            }
            config.validate()?;
            inner.queue = KeyQueue::new(config.capacity, config.max_age);
            inner.config = Some(config.clone());
            inner.state = PoolState::Running;
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for id in 0..config.workers {
            let shared = Arc::clone(&self.shared);
            let generator = Arc::clone(&self.generator);
            let worker_config = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("key-pool-worker-{}", id))
                .spawn(move || run_worker(id, &shared, generator.as_ref(), &worker_config));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(workers);
                    self.stop();
                    return Err(PoolError::WorkerSpawn(e.to_string()));
                }
            }
        }

        info!(
            key_bits = config.key_bits,
            workers = config.workers,
            capacity = config.capacity,
            max_age_secs = config.max_age.as_secs(),
            "key pool started"
        );
        Ok(())
    }

    /// Remove and return the oldest fresh key, blocking until one exists.
    ///
    /// Returns [`PoolError::NotRunning`] when the queue is empty and no
    /// worker can refill it.
    pub fn get(&self) -> PoolResult<KeyPair> {
        self.take(None)
    }

    /// Like [`get`](Self::get) but gives up after `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits like `get`.
    pub fn get_timeout(&self, timeout: Duration) -> PoolResult<KeyPair> {
        self.take(Instant::now().checked_add(timeout))
    }

    fn take(&self, deadline: Option<Instant>) -> PoolResult<KeyPair> {
        let mut inner = self.shared.lock();
        loop {
            let (key, rotation) = inner.queue.pop_fresh(Instant::now());
            log_rotation(&rotation, inner.queue.len());

            if let Some(key) = key {
                self.shared.space.notify_all();
                return Ok(key);
            }
            if !rotation.is_empty() {
                self.shared.space.notify_all();
            }
            if inner.state != PoolState::Running {
                return Err(PoolError::NotRunning);
            }

            inner = match deadline {
                None => self
                    .shared
                    .available
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(PoolError::Timeout);
                    }
                    self.shared
                        .available
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Ask the workers to finish their current key and exit, then join them.
    ///
    /// An in-flight generation is not interrupted; its key is discarded.
    pub fn stop(&self) {
        let was_running = {
            let mut inner = self.shared.lock();
            let was_running = inner.state == PoolState::Running;
            inner.state = PoolState::Stopped;
            was_running
        };
        self.shared.available.notify_all();
        self.shared.space.notify_all();

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("key pool worker panicked");
            }
        }

        if was_running {
            info!("key pool stopped");
        }
    }

    /// Number of keys currently queued.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().state == PoolState::Running
    }

    /// The configuration the pool was started with, if any.
    pub fn config(&self) -> Option<PoolConfig> {
        self.shared.lock().config.clone()
    }
}

impl Drop for KeyPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_rotation(rotation: &Rotation, queue_len: usize) {
    if rotation.over_capacity > 0 {
        debug!(
            evicted = rotation.over_capacity,
            queue_len, "rotated keys for exceeding capacity"
        );
    }
    if rotation.expired > 0 {
        debug!(evicted = rotation.expired, queue_len, "rotated keys for being too old");
    }
}

fn run_worker(id: usize, shared: &Shared, generator: &dyn KeyGenerator, config: &PoolConfig) {
    debug!(worker = id, "key pool worker started");

    loop {
        // Paused while full: run rotation every interval instead of generating.
        {
            let mut inner = shared.lock();
            loop {
                if inner.state != PoolState::Running {
                    debug!(worker = id, "key pool worker exiting");
                    return;
                }
                let rotation = inner.queue.rotate(Instant::now());
                log_rotation(&rotation, inner.queue.len());
                if !inner.queue.is_full() {
                    break;
                }
                inner = shared
                    .space
                    .wait_timeout(inner, config.rotation_interval)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }

        match generator.generate(config.key_bits) {
            Ok(key) => {
                let created_at = Instant::now();
                let mut inner = shared.lock();
                if inner.state != PoolState::Running {
                    debug!(worker = id, "discarding key generated after stop");
                    return;
                }
                inner.queue.push(key, created_at);
                let rotation = inner.queue.rotate(created_at);
                log_rotation(&rotation, inner.queue.len());
                debug!(worker = id, queue_len = inner.queue.len(), "generated key");
                shared.available.notify_one();
            }
            Err(e) => {
                warn!(worker = id, error = %e, "key generation failed, retrying");
                let inner = shared.lock();
                if inner.state != PoolState::Running {
                    return;
                }
                drop(
                    shared
                        .space
                        .wait_timeout(inner, config.rotation_interval)
                        .unwrap_or_else(PoisonError::into_inner),
                );
            }
        }
    }
}
