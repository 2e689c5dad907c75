use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::StoreError;
use crate::store::{ScanRange, Store, Transaction};

type Keyspace = OrdMap<Vec<u8>, Vec<u8>>;

/// In-memory store backed by persistent ordered maps.
///
/// Readers snapshot keyspaces via `ArcSwap` load (no locking); a single
/// write transaction at a time holds the store-wide write mutex, making
/// commit an atomic pointer swap per dirty keyspace. Structural sharing in
/// `imbl` keeps snapshots cheap.
pub struct MemoryStore {
    keyspaces: RwLock<HashMap<String, Arc<ArcSwap<Keyspace>>>>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keyspaces: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    fn snapshot(&self, name: &str) -> Option<Keyspace> {
        let keyspaces = self.keyspaces.read().unwrap();
        keyspaces.get(name).map(|arc| (**arc.load()).clone())
    }

    fn publish(&self, name: &str, data: Keyspace) {
        let keyspaces = self.keyspaces.read().unwrap();
        if let Some(arc) = keyspaces.get(name) {
            arc.store(Arc::new(data));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    type Txn<'a> = MemoryTransaction<'a>;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError> {
        let write_guard = if read_only {
            None
        } else {
            Some(
                self.write_lock
                    .lock()
                    .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))?,
            )
        };
        Ok(MemoryTransaction {
            store: self,
            local: RefCell::new(Some(HashMap::new())),
            dirty: RefCell::new(HashSet::new()),
            read_only,
            _write_guard: write_guard,
        })
    }

    fn create_keyspace(&self, name: &str) -> Result<(), StoreError> {
        let mut keyspaces = self.keyspaces.write().unwrap();
        keyspaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(OrdMap::new()))));
        Ok(())
    }

    fn drop_keyspace(&self, name: &str) -> Result<(), StoreError> {
        let mut keyspaces = self.keyspaces.write().unwrap();
        keyspaces.remove(name);
        Ok(())
    }
}

/// Keyspace handle for the memory backend: a name token. Reads resolve
/// through the transaction-local snapshot so a transaction sees its own
/// writes.
#[derive(Clone)]
pub struct MemoryKs {
    name: String,
}

pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    /// Lazily populated per-keyspace snapshots, mutated in place by writes.
    local: RefCell<Option<HashMap<String, Keyspace>>>,
    dirty: RefCell<HashSet<String>>,
    read_only: bool,
    _write_guard: Option<MutexGuard<'a, ()>>,
}

impl MemoryTransaction<'_> {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn ensure_loaded(&self, name: &str) -> Result<(), StoreError> {
        let mut local = self.local.borrow_mut();
        let local = local.as_mut().ok_or(StoreError::TransactionConsumed)?;
        if !local.contains_key(name) {
            let data = self
                .store
                .snapshot(name)
                .ok_or_else(|| StoreError::MissingKeyspace(name.to_string()))?;
            local.insert(name.to_string(), data);
        }
        Ok(())
    }

    fn with_keyspace<R>(
        &self,
        ks: &MemoryKs,
        f: impl FnOnce(&Keyspace) -> R,
    ) -> Result<R, StoreError> {
        let local = self.local.borrow();
        let local = local.as_ref().ok_or(StoreError::TransactionConsumed)?;
        let data = local
            .get(&ks.name)
            .ok_or_else(|| StoreError::MissingKeyspace(ks.name.clone()))?;
        Ok(f(data))
    }

    fn with_keyspace_mut<R>(
        &self,
        ks: &MemoryKs,
        f: impl FnOnce(&mut Keyspace) -> R,
    ) -> Result<R, StoreError> {
        self.check_writable()?;
        self.dirty.borrow_mut().insert(ks.name.clone());
        let mut local = self.local.borrow_mut();
        let local = local.as_mut().ok_or(StoreError::TransactionConsumed)?;
        let data = local
            .get_mut(&ks.name)
            .ok_or_else(|| StoreError::MissingKeyspace(ks.name.clone()))?;
        Ok(f(data))
    }
}

impl Transaction for MemoryTransaction<'_> {
    type Ks = MemoryKs;

    fn keyspace(&self, name: &str) -> Result<Self::Ks, StoreError> {
        self.ensure_loaded(name)?;
        Ok(MemoryKs {
            name: name.to_string(),
        })
    }

    fn get(&self, ks: &Self::Ks, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_keyspace(ks, |data| data.get(key).cloned())
    }

    fn scan_range<'b>(
        &'b self,
        ks: &Self::Ks,
        range: ScanRange,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'b>, StoreError>
    {
        // Materialize under the RefCell borrow; the iterator must not hold it.
        let entries = self.with_keyspace(ks, |data| {
            let bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>) = (range.lower, range.upper);
            let mut entries: Vec<(Vec<u8>, Vec<u8>)> = data
                .range(bounds)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if reverse {
                entries.reverse();
            }
            entries
        })?;
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn put(&self, ks: &Self::Ks, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.with_keyspace_mut(ks, |data| {
            data.insert(key.to_vec(), value.to_vec());
        })
    }

    fn put_batch(&self, ks: &Self::Ks, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError> {
        self.with_keyspace_mut(ks, |data| {
            for (key, value) in entries {
                data.insert(key.clone(), value.clone());
            }
        })
    }

    fn delete(&self, ks: &Self::Ks, key: &[u8]) -> Result<(), StoreError> {
        self.with_keyspace_mut(ks, |data| {
            data.remove(key);
        })
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let local = self
            .local
            .into_inner()
            .ok_or(StoreError::TransactionConsumed)?;
        let dirty = self.dirty.into_inner();
        for (name, data) in local {
            if dirty.contains(&name) {
                self.store.publish(&name, data);
            }
        }
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        if self.local.into_inner().is_none() {
            return Err(StoreError::TransactionConsumed);
        }
        Ok(())
    }
}
