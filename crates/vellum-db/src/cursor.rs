use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use bson::Document;

use crate::error::DbError;

/// On-disk spill store for cursor result batches.
///
/// Each cursor owns one file of concatenated raw BSON documents. A shared
/// counter guards the live-file budget; the background sweep walks the
/// directory without the lock and takes it only to decrement per deleted
/// file.
pub struct CursorStore {
    dir: PathBuf,
    ttl: Duration,
    capacity: usize,
    open_count: Mutex<usize>,
}

const CURSOR_PREFIX: &str = "cursor-";
const CURSOR_SUFFIX: &str = ".bin";

impl CursorStore {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize, ttl: Duration) -> Result<Self, DbError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(CursorStore {
            dir,
            ttl,
            capacity,
            open_count: Mutex::new(0),
        })
    }

    pub fn open_count(&self) -> usize {
        self.open_count.lock().map(|count| *count).unwrap_or(0)
    }

    fn file_path(&self, cursor_id: u64) -> PathBuf {
        self.dir.join(format!("{CURSOR_PREFIX}{cursor_id}{CURSOR_SUFFIX}"))
    }

    /// Spill a result batch. Fails when the live-file budget is exhausted.
    pub fn spill(&self, cursor_id: u64, docs: &[Document]) -> Result<PathBuf, DbError> {
        {
            let mut count = self
                .open_count
                .lock()
                .map_err(|_| DbError::Internal("cursor counter poisoned".into()))?;
            if *count >= self.capacity {
                return Err(DbError::Configuration(format!(
                    "cursor budget exhausted: {} files already open",
                    self.capacity
                )));
            }
            *count += 1;
        }

        let path = self.file_path(cursor_id);
        let file = fs::File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for doc in docs {
            let raw = bson::RawDocumentBuf::try_from(doc)
                .map_err(|e| DbError::Internal(format!("encode cursor batch: {e}")))?;
            writer.write_all(raw.as_bytes())?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Read a spilled batch back. BSON documents are self-delimiting, so
    /// the file is just walked length by length.
    pub fn read(&self, cursor_id: u64) -> Result<Vec<Document>, DbError> {
        let bytes = fs::read(self.file_path(cursor_id))?;
        let mut docs = Vec::new();
        let mut offset = 0usize;
        while offset + 4 <= bytes.len() {
            let len = i32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]) as usize;
            if len < 5 || offset + len > bytes.len() {
                return Err(DbError::Internal(format!(
                    "malformed cursor file for cursor {cursor_id}"
                )));
            }
            let doc: Document = bson::deserialize_from_slice(&bytes[offset..offset + len])
                .map_err(|e| DbError::Internal(format!("decode cursor batch: {e}")))?;
            docs.push(doc);
            offset += len;
        }
        Ok(docs)
    }

    /// Drop one cursor's file and release its budget slot.
    pub fn remove(&self, cursor_id: u64) -> Result<(), DbError> {
        let path = self.file_path(cursor_id);
        if path.exists() {
            fs::remove_file(&path)?;
            self.decrement();
        }
        Ok(())
    }

    /// Delete expired cursor files. The directory walk runs without the
    /// counter lock; the lock is taken briefly per deleted file.
    pub fn sweep_expired(&self) -> Result<u64, DbError> {
        let now = SystemTime::now();
        let mut deleted = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !is_cursor_file(&entry.path()) {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| {
                    now.duration_since(modified)
                        .map(|age| age >= self.ttl)
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            if expired && fs::remove_file(entry.path()).is_ok() {
                self.decrement();
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn decrement(&self) {
        if let Ok(mut count) = self.open_count.lock() {
            *count = count.saturating_sub(1);
        }
    }
}

fn is_cursor_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(CURSOR_PREFIX) && name.ends_with(CURSOR_SUFFIX))
        .unwrap_or(false)
}
