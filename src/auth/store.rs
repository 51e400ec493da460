//! Credential persistence.
//!
//! This module provides the `TokenStore` trait - the single owner of
//! persisted credentials - plus three implementations:
//! - `MemoryStore`: both scopes in process memory
//! - `FileStore`: durable scope as a JSON file on disk
//! - `KeyringStore`: durable scope in the OS keychain
//!
//! A store holds at most one live credential pair per scope and writes
//! each pair as a single atomic unit. Stores also carry the advisory
//! refresh lease that keeps concurrent application instances from racing
//! to refresh the same session.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;

use super::tokens::{CredentialPair, StorageScope};

/// Session file name inside the store directory
const SESSION_FILE: &str = "session.json";

/// Refresh lease file name inside the store directory
const LEASE_FILE: &str = "refresh.lock";

/// Keychain service name for keyring-backed stores
const SERVICE_NAME: &str = "authkeep";

/// Keychain account under which the serialized pair is stored
const SESSION_ACCOUNT: &str = "session";

/// Persistence abstraction holding one credential pair per lifetime scope.
///
/// Implementations must serialize `put` against `get`/`resolve` so no
/// caller ever observes a partially written pair, and `clear` must be
/// idempotent. Stores never make network calls.
pub trait TokenStore: Send + Sync {
    /// Write the pair for `scope` as one atomic unit, replacing any
    /// existing pair in that scope.
    fn put(&self, scope: StorageScope, pair: CredentialPair) -> Result<()>;

    /// Read the pair stored for `scope`, if any.
    fn get(&self, scope: StorageScope) -> Result<Option<CredentialPair>>;

    /// Remove credentials from both scopes unconditionally.
    fn clear(&self) -> Result<()>;

    /// The authoritative pair: durable wins over ephemeral when both
    /// scopes happen to be populated.
    fn resolve(&self) -> Result<Option<(StorageScope, CredentialPair)>> {
        if let Some(pair) = self.get(StorageScope::Durable)? {
            return Ok(Some((StorageScope::Durable, pair)));
        }
        Ok(self
            .get(StorageScope::Ephemeral)?
            .map(|pair| (StorageScope::Ephemeral, pair)))
    }

    /// Try to acquire the advisory refresh lease.
    ///
    /// At most one holder at a time across all instances sharing the
    /// storage medium; a lease older than `ttl` is considered abandoned
    /// and may be taken over.
    fn try_refresh_lease(&self, ttl: Duration) -> bool;

    /// Release the advisory refresh lease. Safe to call when not held.
    fn release_refresh_lease(&self);
}

/// In-process lease used by stores whose medium has no exclusive-create
/// primitive. Tracks acquisition time so an abandoned lease expires.
#[derive(Default)]
struct LocalLease {
    held_since: Mutex<Option<DateTime<Utc>>>,
}

impl LocalLease {
    fn try_acquire(&self, ttl: Duration) -> bool {
        let mut held = self.held_since.lock().unwrap();
        let now = Utc::now();
        match *held {
            Some(since) if now.signed_duration_since(since).to_std().unwrap_or_default() <= ttl => {
                false
            }
            _ => {
                *held = Some(now);
                true
            }
        }
    }

    fn release(&self) {
        *self.held_since.lock().unwrap() = None;
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Volatile store keeping both scopes in process memory.
/// Used by tests and short-lived tools; nothing survives restart.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<Slots>,
    lease: LocalLease,
}

#[derive(Default)]
struct Slots {
    durable: Option<CredentialPair>,
    ephemeral: Option<CredentialPair>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn put(&self, scope: StorageScope, pair: CredentialPair) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        match scope {
            StorageScope::Durable => slots.durable = Some(pair),
            StorageScope::Ephemeral => slots.ephemeral = Some(pair),
        }
        Ok(())
    }

    fn get(&self, scope: StorageScope) -> Result<Option<CredentialPair>> {
        let slots = self.slots.lock().unwrap();
        Ok(match scope {
            StorageScope::Durable => slots.durable.clone(),
            StorageScope::Ephemeral => slots.ephemeral.clone(),
        })
    }

    fn clear(&self) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        slots.durable = None;
        slots.ephemeral = None;
        Ok(())
    }

    fn try_refresh_lease(&self, ttl: Duration) -> bool {
        self.lease.try_acquire(ttl)
    }

    fn release_refresh_lease(&self) {
        self.lease.release();
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// Store persisting the durable scope as a JSON file on disk.
///
/// Writes go to a temp file first and are renamed into place, so readers
/// see either the old pair or the new one, never a partial write. The
/// refresh lease is a lock file created exclusively, which also covers
/// other processes sharing the same directory.
pub struct FileStore {
    dir: PathBuf,
    ephemeral: Mutex<Option<CredentialPair>>,
    // Serializes file access within this process
    io: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        Ok(Self {
            dir,
            ephemeral: Mutex::new(None),
            io: Mutex::new(()),
        })
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn lease_path(&self) -> PathBuf {
        self.dir.join(LEASE_FILE)
    }
}

impl TokenStore for FileStore {
    fn put(&self, scope: StorageScope, pair: CredentialPair) -> Result<()> {
        match scope {
            StorageScope::Durable => {
                let _io = self.io.lock().unwrap();
                let path = self.session_path();
                let tmp = path.with_extension("json.tmp");
                let contents = serde_json::to_string_pretty(&pair)?;
                std::fs::write(&tmp, contents)
                    .with_context(|| format!("Failed to write session file {}", tmp.display()))?;
                std::fs::rename(&tmp, &path)
                    .context("Failed to move session file into place")?;
            }
            StorageScope::Ephemeral => {
                *self.ephemeral.lock().unwrap() = Some(pair);
            }
        }
        Ok(())
    }

    fn get(&self, scope: StorageScope) -> Result<Option<CredentialPair>> {
        match scope {
            StorageScope::Durable => {
                let _io = self.io.lock().unwrap();
                let path = self.session_path();
                if !path.exists() {
                    return Ok(None);
                }
                let contents =
                    std::fs::read_to_string(&path).context("Failed to read session file")?;
                let pair: CredentialPair =
                    serde_json::from_str(&contents).context("Failed to parse session file")?;
                Ok(Some(pair))
            }
            StorageScope::Ephemeral => Ok(self.ephemeral.lock().unwrap().clone()),
        }
    }

    fn clear(&self) -> Result<()> {
        let _io = self.io.lock().unwrap();
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        *self.ephemeral.lock().unwrap() = None;
        Ok(())
    }

    fn try_refresh_lease(&self, ttl: Duration) -> bool {
        let _io = self.io.lock().unwrap();
        let path = self.lease_path();
        let now = Utc::now();
        // Timestamp plus pid identifies this claimant; the nanosecond
        // timestamp keeps claims distinct even within one process
        let claim = format!("{} {}", now.to_rfc3339(), std::process::id());

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                let _ = write!(file, "{}", claim);
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                // Another instance holds the lease; take it over only if
                // the holder looks abandoned
                let stale = match std::fs::read_to_string(&path) {
                    Ok(contents) => contents
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .parse::<DateTime<Utc>>()
                        .map(|since| {
                            now.signed_duration_since(since).to_std().unwrap_or_default() > ttl
                        })
                        .unwrap_or(true),
                    Err(_) => true,
                };
                if !stale {
                    return false;
                }
                if std::fs::write(&path, &claim).is_err() {
                    return false;
                }
                // Re-read to confirm our claim survived; a concurrent
                // takeover by another process overwrites it and wins
                matches!(std::fs::read_to_string(&path), Ok(contents) if contents == claim)
            }
            Err(_) => false,
        }
    }

    fn release_refresh_lease(&self) {
        let _io = self.io.lock().unwrap();
        let _ = std::fs::remove_file(self.lease_path());
    }
}

// ============================================================================
// KeyringStore
// ============================================================================

/// Store persisting the durable scope in the OS keychain.
///
/// The serialized pair is stored as the secret of a single keychain
/// entry, so a `put` replaces all four logical fields at once. The
/// refresh lease is in-process only: keychains offer no exclusive-create
/// primitive to coordinate across processes.
pub struct KeyringStore {
    service: String,
    ephemeral: Mutex<Option<CredentialPair>>,
    lease: LocalLease,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name, e.g. to isolate test runs.
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            ephemeral: Mutex::new(None),
            lease: LocalLease::default(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl TokenStore for KeyringStore {
    fn put(&self, scope: StorageScope, pair: CredentialPair) -> Result<()> {
        match scope {
            StorageScope::Durable => {
                let contents = serde_json::to_string(&pair)?;
                self.entry()?
                    .set_password(&contents)
                    .context("Failed to store session in keychain")?;
            }
            StorageScope::Ephemeral => {
                *self.ephemeral.lock().unwrap() = Some(pair);
            }
        }
        Ok(())
    }

    fn get(&self, scope: StorageScope) -> Result<Option<CredentialPair>> {
        match scope {
            StorageScope::Durable => match self.entry()?.get_password() {
                Ok(contents) => {
                    let pair: CredentialPair = serde_json::from_str(&contents)
                        .context("Failed to parse keychain session")?;
                    Ok(Some(pair))
                }
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(err) => Err(err).context("Failed to read session from keychain"),
            },
            StorageScope::Ephemeral => Ok(self.ephemeral.lock().unwrap().clone()),
        }
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(err) => return Err(err).context("Failed to delete session from keychain"),
        }
        *self.ephemeral.lock().unwrap() = None;
        Ok(())
    }

    fn try_refresh_lease(&self, ttl: Duration) -> bool {
        self.lease.try_acquire(ttl)
    }

    fn release_refresh_lease(&self) {
        self.lease.release();
    }
}
