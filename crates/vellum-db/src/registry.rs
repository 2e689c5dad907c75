use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DbError;

/// Capability entry for a named index access method, the fixed surface the
/// catalog layer discovers adapters through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessMethodEntry {
    pub name: &'static str,
    pub catalog_schema: &'static str,
    pub composite_supported: bool,
    pub order_by_supported: bool,
    pub backward_scan_supported: bool,
}

/// The composite adapter's own registration.
pub const COMPOSITE_ACCESS_METHOD: AccessMethodEntry = AccessMethodEntry {
    name: "vellum_composite",
    catalog_schema: "vellum_catalog",
    composite_supported: true,
    order_by_supported: true,
    backward_scan_supported: true,
};

#[derive(Debug, Default)]
pub struct AccessMethodRegistry {
    entries: RwLock<HashMap<&'static str, AccessMethodEntry>>,
}

impl AccessMethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an access method. Registering the same name twice is a
    /// configuration error.
    pub fn register(&self, entry: AccessMethodEntry) -> Result<(), DbError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DbError::Internal("access method registry poisoned".into()))?;
        if entries.contains_key(entry.name) {
            return Err(DbError::Configuration(format!(
                "access method {} is already registered",
                entry.name
            )));
        }
        tracing::debug!(name = entry.name, "registered index access method");
        entries.insert(entry.name, entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<AccessMethodEntry, DbError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DbError::Internal("access method registry poisoned".into()))?;
        entries.get(name).cloned().ok_or_else(|| {
            DbError::Configuration(format!("access method {name} not found in catalog"))
        })
    }
}

/// Process-scoped read-through cache for catalog object ids.
///
/// Ids are resolved lazily and memoized; `invalidate` is the explicit hook
/// for catalog-change events, there is no implicit expiry.
#[derive(Debug, Default)]
pub struct CatalogIdCache {
    ids: RwLock<HashMap<String, u64>>,
    next: AtomicU64,
}

impl CatalogIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> u64 {
        if let Ok(ids) = self.ids.read() {
            if let Some(id) = ids.get(name) {
                return *id;
            }
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut ids) = self.ids.write() {
            // Another thread may have resolved it in the window; keep the
            // first id so it stays stable.
            return *ids.entry(name.to_string()).or_insert(id);
        }
        id
    }

    pub fn invalidate(&self, name: &str) {
        if let Ok(mut ids) = self.ids.write() {
            ids.remove(name);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut ids) = self.ids.write() {
            ids.clear();
        }
    }
}
