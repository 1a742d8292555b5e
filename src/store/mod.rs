//! Indexed persistence collaborator.
//!
//! The core treats persistence as an external key-value store with
//! secondary indexes, consumed through [`IndexedStore`]. All canonical
//! simulation state lives in memory; the store is write-behind, so a failed
//! call degrades the system to memory-only operation instead of stopping
//! it. [`StoreGateway`] centralizes the retry policy and the circuit
//! breaker that makes that degradation sticky until a cooldown passes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::constants::{
    CIRCUIT_BREAKER_THRESHOLD, CIRCUIT_COOLDOWN_TICKS, STORE_BACKOFF_BASE_MS,
    STORE_RETRY_MAX_ATTEMPTS, STORE_VERSION_MAGIC,
};
use crate::error::{SimError, SimResult};

/// An opaque structured record. The payload is serialized JSON; the core
/// never asks the store to understand it. Secondary-index entries are
/// carried alongside so any backend can maintain its indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    /// (index name, index value) pairs this record appears under.
    pub index_entries: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl StoredRecord {
    pub fn new<T: Serialize>(
        key: impl Into<String>,
        index_entries: Vec<(String, String)>,
        value: &T,
    ) -> SimResult<Self> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| SimError::StoreUnavailable(format!("serialize: {}", e)))?;
        Ok(Self {
            key: key.into(),
            index_entries,
            payload,
        })
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> SimResult<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| SimError::StoreUnavailable(format!("decode {}: {}", self.key, e)))
    }
}

/// External key-value store with secondary indexes.
///
/// Calls are synchronous and issued only at tick boundaries; they must be
/// idempotent on retry.
pub trait IndexedStore {
    fn get(&self, key: &str) -> SimResult<Option<StoredRecord>>;
    fn put_batch(&mut self, records: Vec<StoredRecord>) -> SimResult<()>;
    /// All records whose `index` value lies in `[start, end]`.
    fn query_by_index(&self, index: &str, start: &str, end: &str) -> SimResult<Vec<StoredRecord>>;
    fn delete_by_key(&mut self, key: &str) -> SimResult<()>;
    fn count_by_index(&self, index: &str, value: &str) -> SimResult<usize>;
}

/// In-memory backend. Also the substrate of [`FileStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    records: HashMap<String, StoredRecord>,
    #[serde(skip)]
    indexes: HashMap<String, BTreeMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn unindex(&mut self, record: &StoredRecord) {
        for (index, value) in &record.index_entries {
            if let Some(by_value) = self.indexes.get_mut(index) {
                if let Some(keys) = by_value.get_mut(value) {
                    keys.remove(&record.key);
                    if keys.is_empty() {
                        by_value.remove(value);
                    }
                }
            }
        }
    }

    fn index(&mut self, record: &StoredRecord) {
        for (index, value) in &record.index_entries {
            self.indexes
                .entry(index.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(record.key.clone());
        }
    }

    fn rebuild_indexes(&mut self) {
        self.indexes.clear();
        let records: Vec<StoredRecord> = self.records.values().cloned().collect();
        for record in records {
            self.index(&record);
        }
    }
}

impl IndexedStore for MemoryStore {
    fn get(&self, key: &str) -> SimResult<Option<StoredRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn put_batch(&mut self, records: Vec<StoredRecord>) -> SimResult<()> {
        for record in records {
            if let Some(old) = self.records.remove(&record.key) {
                self.unindex(&old);
            }
            self.index(&record);
            self.records.insert(record.key.clone(), record);
        }
        Ok(())
    }

    fn query_by_index(&self, index: &str, start: &str, end: &str) -> SimResult<Vec<StoredRecord>> {
        let mut out = Vec::new();
        if let Some(by_value) = self.indexes.get(index) {
            for keys in by_value
                .range(start.to_string()..=end.to_string())
                .map(|(_, keys)| keys)
            {
                for key in keys {
                    if let Some(record) = self.records.get(key) {
                        out.push(record.clone());
                    }
                }
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn delete_by_key(&mut self, key: &str) -> SimResult<()> {
        if let Some(old) = self.records.remove(key) {
            self.unindex(&old);
        }
        Ok(())
    }

    fn count_by_index(&self, index: &str, value: &str) -> SimResult<usize> {
        Ok(self
            .indexes
            .get(index)
            .and_then(|by_value| by_value.get(value))
            .map_or(0, |keys| keys.len()))
    }
}

/// File-backed store: the whole record set as one checksummed binary blob.
///
/// File format: version magic (8 bytes), data length (4 bytes), bincode
/// payload, SHA-256 checksum (32 bytes). A missing or corrupt file starts
/// the store empty rather than failing.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Opens the store at the platform data directory.
    pub fn open_default() -> SimResult<Self> {
        let dirs = directories::ProjectDirs::from("", "", "warfront").ok_or_else(|| {
            SimError::StoreUnavailable("could not determine data directory".to_string())
        })?;
        let dir = dirs.data_dir();
        fs::create_dir_all(dir)
            .map_err(|e| SimError::StoreUnavailable(format!("create dir: {}", e)))?;
        Self::open(dir.join("store.dat"))
    }

    pub fn open(path: PathBuf) -> SimResult<Self> {
        let inner = match Self::load(&path) {
            Ok(inner) => inner,
            Err(SimError::StoreUnavailable(reason)) => {
                warn!(%reason, "store file unreadable; starting empty");
                MemoryStore::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self { inner, path })
    }

    fn load(path: &PathBuf) -> SimResult<MemoryStore> {
        if !path.exists() {
            return Ok(MemoryStore::new());
        }
        let mut file = fs::File::open(path)
            .map_err(|e| SimError::StoreUnavailable(format!("open: {}", e)))?;

        let mut version_bytes = [0u8; 8];
        file.read_exact(&mut version_bytes)
            .map_err(|e| SimError::StoreUnavailable(format!("read magic: {}", e)))?;
        if u64::from_le_bytes(version_bytes) != STORE_VERSION_MAGIC {
            return Err(SimError::StoreUnavailable("bad version magic".to_string()));
        }

        let mut length_bytes = [0u8; 4];
        file.read_exact(&mut length_bytes)
            .map_err(|e| SimError::StoreUnavailable(format!("read length: {}", e)))?;
        let data_len = u32::from_le_bytes(length_bytes);

        let mut data = vec![0u8; data_len as usize];
        file.read_exact(&mut data)
            .map_err(|e| SimError::StoreUnavailable(format!("read payload: {}", e)))?;

        let mut stored_checksum = [0u8; 32];
        file.read_exact(&mut stored_checksum)
            .map_err(|e| SimError::StoreUnavailable(format!("read checksum: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(version_bytes);
        hasher.update(length_bytes);
        hasher.update(&data);
        if stored_checksum != hasher.finalize().as_slice() {
            return Err(SimError::StoreUnavailable("checksum mismatch".to_string()));
        }

        let mut store: MemoryStore = bincode::deserialize(&data)
            .map_err(|e| SimError::StoreUnavailable(format!("deserialize: {}", e)))?;
        store.rebuild_indexes();
        Ok(store)
    }

    fn persist(&self) -> SimResult<()> {
        let data = bincode::serialize(&self.inner)
            .map_err(|e| SimError::StoreUnavailable(format!("serialize: {}", e)))?;
        let data_len = data.len() as u32;

        let mut hasher = Sha256::new();
        hasher.update(STORE_VERSION_MAGIC.to_le_bytes());
        hasher.update(data_len.to_le_bytes());
        hasher.update(&data);
        let checksum = hasher.finalize();

        let mut file = fs::File::create(&self.path)
            .map_err(|e| SimError::StoreUnavailable(format!("create: {}", e)))?;
        file.write_all(&STORE_VERSION_MAGIC.to_le_bytes())
            .and_then(|_| file.write_all(&data_len.to_le_bytes()))
            .and_then(|_| file.write_all(&data))
            .and_then(|_| file.write_all(&checksum))
            .map_err(|e| SimError::StoreUnavailable(format!("write: {}", e)))
    }
}

impl IndexedStore for FileStore {
    fn get(&self, key: &str) -> SimResult<Option<StoredRecord>> {
        self.inner.get(key)
    }

    fn put_batch(&mut self, records: Vec<StoredRecord>) -> SimResult<()> {
        self.inner.put_batch(records)?;
        self.persist()
    }

    fn query_by_index(&self, index: &str, start: &str, end: &str) -> SimResult<Vec<StoredRecord>> {
        self.inner.query_by_index(index, start, end)
    }

    fn delete_by_key(&mut self, key: &str) -> SimResult<()> {
        self.inner.delete_by_key(key)?;
        self.persist()
    }

    fn count_by_index(&self, index: &str, value: &str) -> SimResult<usize> {
        self.inner.count_by_index(index, value)
    }
}

/// Retry policy for store calls: bounded immediate retries per call, then a
/// circuit breaker that flips the gateway into memory-only mode for a
/// cooldown measured in ticks (the loop never sleeps).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub breaker_threshold: u32,
    pub cooldown_ticks: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: STORE_RETRY_MAX_ATTEMPTS,
            backoff_base_ms: STORE_BACKOFF_BASE_MS,
            breaker_threshold: CIRCUIT_BREAKER_THRESHOLD,
            cooldown_ticks: CIRCUIT_COOLDOWN_TICKS,
        }
    }
}

/// Gateway in front of the real store: applies the retry policy, trips the
/// circuit breaker after repeated failures, and surfaces every failure as
/// [`SimError::StoreUnavailable`] so callers can ignore it and continue
/// memory-only.
pub struct StoreGateway {
    store: Box<dyn IndexedStore>,
    policy: RetryPolicy,
    consecutive_failures: u32,
    open_until_tick: Option<u64>,
}

impl StoreGateway {
    pub fn new(store: Box<dyn IndexedStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            consecutive_failures: 0,
            open_until_tick: None,
        }
    }

    /// True while the breaker is open and calls are being shed.
    pub fn is_memory_only(&self, tick: u64) -> bool {
        self.open_until_tick.is_some_and(|until| tick < until)
    }

    fn check_circuit(&mut self, tick: u64) -> SimResult<()> {
        if let Some(until) = self.open_until_tick {
            if tick < until {
                return Err(SimError::StoreUnavailable(format!(
                    "circuit open until tick {}",
                    until
                )));
            }
            // Cooldown over; give the store another chance.
            self.open_until_tick = None;
            self.consecutive_failures = 0;
        }
        Ok(())
    }

    fn record_outcome<T>(&mut self, tick: u64, result: SimResult<T>) -> SimResult<T> {
        match result {
            Ok(value) => {
                self.consecutive_failures = 0;
                Ok(value)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.policy.breaker_threshold {
                    let until = tick + self.policy.cooldown_ticks;
                    warn!(
                        failures = self.consecutive_failures,
                        until, "store circuit opened; continuing memory-only"
                    );
                    self.open_until_tick = Some(until);
                }
                Err(e)
            }
        }
    }

    fn with_retries<T>(
        &mut self,
        tick: u64,
        mut call: impl FnMut(&mut dyn IndexedStore) -> SimResult<T>,
    ) -> SimResult<T> {
        self.check_circuit(tick)?;
        let mut last_err = None;
        for attempt in 0..self.policy.max_attempts {
            match call(self.store.as_mut()) {
                Ok(value) => return self.record_outcome(tick, Ok(value)),
                Err(e) => {
                    // Exponential backoff is bookkeeping only; the
                    // single-threaded loop must not block.
                    let _delay_ms = self.policy.backoff_base_ms << attempt;
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| {
            SimError::StoreUnavailable("retries exhausted".to_string())
        });
        self.record_outcome(tick, Err(err))
    }

    pub fn get(&mut self, tick: u64, key: &str) -> SimResult<Option<StoredRecord>> {
        self.with_retries(tick, |s| s.get(key))
    }

    pub fn put_batch(&mut self, tick: u64, records: &[StoredRecord]) -> SimResult<()> {
        self.with_retries(tick, |s| s.put_batch(records.to_vec()))
    }

    pub fn query_by_index(
        &mut self,
        tick: u64,
        index: &str,
        start: &str,
        end: &str,
    ) -> SimResult<Vec<StoredRecord>> {
        self.with_retries(tick, |s| s.query_by_index(index, start, end))
    }

    pub fn delete_by_key(&mut self, tick: u64, key: &str) -> SimResult<()> {
        self.with_retries(tick, |s| s.delete_by_key(key))
    }

    pub fn count_by_index(&mut self, tick: u64, index: &str, value: &str) -> SimResult<usize> {
        self.with_retries(tick, |s| s.count_by_index(index, value))
    }
}
