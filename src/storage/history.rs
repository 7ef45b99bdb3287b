//! The in-memory history store shared by all crawl workers

use crate::site::ResourceInfo;
use crate::storage::traits::{check_source_id, HistoryBackend, StoreError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Outcome of trying to claim a content hash for download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the download; it must `put` or `release`
    Acquired,
    /// The resource was already collected
    Known,
    /// Another worker is downloading it right now
    InProgress,
}

#[derive(Default)]
struct HistoryState {
    entries: HashMap<String, ResourceInfo>,
    claimed: HashSet<String>,
}

/// Content-addressed record of every resource already collected
///
/// All access is serialized behind a single mutex; the lock is never held
/// across I/O. Because in-progress claims live under the same lock as the
/// entries, checking for a hash and reserving it is one atomic step, so two
/// workers can never both download the same hash.
///
/// The store is loaded once from its backend and flushed back exactly once.
pub struct HistoryStore {
    source_id: String,
    backend: Box<dyn HistoryBackend>,
    state: Mutex<HistoryState>,
    flushed: AtomicBool,
}

impl HistoryStore {
    /// Loads the snapshot named `source_id` from `backend`
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the id is unusable or an existing
    /// snapshot cannot be read. A missing snapshot yields an empty store.
    pub fn load(backend: Box<dyn HistoryBackend>, source_id: &str) -> StoreResult<Self> {
        check_source_id(source_id)?;
        let entries = backend.load(source_id)?;

        Ok(Self {
            source_id: source_id.to_string(),
            backend,
            state: Mutex::new(HistoryState {
                entries,
                claimed: HashSet::new(),
            }),
            flushed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        // every critical section leaves both maps consistent, so poison is harmless
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns true if `hash` has already been collected
    pub fn exists(&self, hash: &str) -> bool {
        self.lock().entries.contains_key(hash)
    }

    /// Returns the record stored for `hash`, if any
    pub fn get(&self, hash: &str) -> Option<ResourceInfo> {
        self.lock().entries.get(hash).cloned()
    }

    /// Inserts or overwrites the record for `info.content_hash`
    ///
    /// Last writer wins. Any claim on the hash is released.
    pub fn put(&self, info: ResourceInfo) {
        let mut state = self.lock();
        state.claimed.remove(&info.content_hash);
        state.entries.insert(info.content_hash.clone(), info);
    }

    /// Atomically checks `hash` and reserves it for the caller
    pub fn try_claim(&self, hash: &str) -> Claim {
        let mut state = self.lock();
        if state.entries.contains_key(hash) {
            Claim::Known
        } else if state.claimed.insert(hash.to_string()) {
            Claim::Acquired
        } else {
            Claim::InProgress
        }
    }

    /// Gives up a claim after a failed download
    pub fn release(&self, hash: &str) {
        self.lock().claimed.remove(hash);
    }

    /// Number of collected resources
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every stored record
    pub fn entries(&self) -> Vec<ResourceInfo> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Name of the backend the store was loaded from
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Persists the full mapping to the backend
    ///
    /// Only the first call writes; later calls fail with
    /// [`StoreError::AlreadyFlushed`]. A write failure is returned to the
    /// caller and leaves the in-memory mapping untouched.
    pub fn flush(&self) -> StoreResult<usize> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyFlushed);
        }

        let snapshot = self.lock().entries.clone();
        self.backend.save(&self.source_id, &snapshot)?;
        Ok(snapshot.len())
    }
}

/// A backend that keeps snapshots in process memory
///
/// Useful for dry runs and tests; snapshots live as long as the backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    snapshots: std::sync::Arc<Mutex<HashMap<String, HashMap<String, ResourceInfo>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, source_id: &str) -> StoreResult<HashMap<String, ResourceInfo>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        Ok(snapshots.get(source_id).cloned().unwrap_or_default())
    }

    fn save(&self, source_id: &str, entries: &HashMap<String, ResourceInfo>) -> StoreResult<()> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        snapshots.insert(source_id.to_string(), entries.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn info(hash: &str, description: &str) -> ResourceInfo {
        ResourceInfo {
            content_hash: hash.to_string(),
            source_url: format!("http://a.com/{hash}.jpg"),
            description: description.to_string(),
            extension: "jpg".to_string(),
        }
    }

    fn empty_store(backend: &MemoryBackend) -> HistoryStore {
        HistoryStore::load(Box::new(backend.clone()), "test").unwrap()
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let store = empty_store(&MemoryBackend::new());
        assert!(store.is_empty());
        assert!(!store.exists("xyz"));
        assert_eq!(store.get("xyz"), None);
    }

    #[test]
    fn test_put_then_exists_and_get() {
        let store = empty_store(&MemoryBackend::new());
        store.put(info("xyz", "test"));
        assert!(store.exists("xyz"));
        assert_eq!(store.get("xyz"), Some(info("xyz", "test")));
    }

    #[test]
    fn test_put_last_writer_wins() {
        let store = empty_store(&MemoryBackend::new());
        store.put(info("xyz", "first"));
        store.put(info("xyz", "second"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("xyz").unwrap().description, "second");
    }

    #[test]
    fn test_round_trip_through_backend() {
        let backend = MemoryBackend::new();
        let store = empty_store(&backend);
        store.put(info("xyz", "test"));
        store.flush().unwrap();

        let reloaded = empty_store(&backend);
        assert_eq!(reloaded.get("xyz"), Some(info("xyz", "test")));
    }

    #[test]
    fn test_flush_only_once() {
        let store = empty_store(&MemoryBackend::new());
        assert_eq!(store.flush().unwrap(), 0);
        assert!(matches!(store.flush(), Err(StoreError::AlreadyFlushed)));
    }

    #[test]
    fn test_claim_lifecycle() {
        let store = empty_store(&MemoryBackend::new());
        assert_eq!(store.try_claim("h"), Claim::Acquired);
        assert_eq!(store.try_claim("h"), Claim::InProgress);

        store.release("h");
        assert_eq!(store.try_claim("h"), Claim::Acquired);

        store.put(info("h", ""));
        assert_eq!(store.try_claim("h"), Claim::Known);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = Arc::new(empty_store(&MemoryBackend::new()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.try_claim("contested") == Claim::Acquired)
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_invalid_source_id() {
        let result = HistoryStore::load(Box::new(MemoryBackend::new()), "../x");
        assert!(matches!(result, Err(StoreError::InvalidSourceId(_))));
    }
}
