use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{StoreError, Table, TableStore};

/// In-memory [`TableStore`] for tests and dry runs.
///
/// Keys registered through [`MemoryTableStore::fail_reads_for`] report a read error,
/// mimicking a corrupt file on disk.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<String, Table>>,
    unreadable: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryTableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, table: Table) {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.into(), table);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Table> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn fail_reads_for(&self, key: impl Into<String>) {
        self.unreadable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.into());
    }

    /// Keys written so far, in write order.
    #[must_use]
    pub fn write_log(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl TableStore for MemoryTableStore {
    fn read(&self, key: &str) -> Result<Option<Table>, StoreError> {
        let unreadable = self
            .unreadable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(key);
        if unreadable {
            return Err(StoreError::Read {
                key: key.to_string(),
                path: format!("memory://{key}").into(),
                source: csv::Error::from(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "simulated unreadable resource",
                )),
            });
        }
        Ok(self.get(key))
    }

    fn write(&self, key: &str, table: &Table) -> Result<(), StoreError> {
        self.insert(key, table.clone());
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(key.to_string());
        Ok(())
    }
}
