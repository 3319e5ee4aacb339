//! Shared registry of open raw files.
//!
//! Both the facade and the write-back cache need to reach files: the
//! facade for lifecycle operations, the flush path for physical writes.
//! The table hands out `Arc<Mutex<RawFile>>` slots so that the registry
//! lock is never held across file I/O: callers clone the slot, drop the
//! table guard, then lock the individual file.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::FileId;
use crate::storage::RawFile;

/// One registered file, serialized by its own mutex.
pub type FileSlot = Arc<Mutex<RawFile>>;

/// Thread-safe map from file id to open file.
pub struct FileTable {
    files: RwLock<HashMap<FileId, FileSlot>>,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, file_id: FileId, file: RawFile) {
        self.files.write().insert(file_id, Arc::new(Mutex::new(file)));
    }

    /// Look up a file slot. The returned `Arc` outlives the registry lock.
    pub fn get(&self, file_id: FileId) -> Option<FileSlot> {
        self.files.read().get(&file_id).cloned()
    }

    pub fn remove(&self, file_id: FileId) -> Option<FileSlot> {
        self.files.write().remove(&file_id)
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.files.read().contains_key(&file_id)
    }

    /// Ids of all registered files, in ascending order.
    pub fn ids(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self.files.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
