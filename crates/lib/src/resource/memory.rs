//! In-process resource store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::types::{Kind, ObjectKey, Record, StoreError};
use super::{ResourceStore, owned_closure};

#[derive(Debug, Default)]
pub struct MemoryStore {
  records: Mutex<BTreeMap<ObjectKey, Record>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn records(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, Record>> {
    self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl ResourceStore for MemoryStore {
  fn get(&self, kind: Kind, name: &str) -> Result<Option<Record>, StoreError> {
    Ok(self.records().get(&ObjectKey::new(kind, name)).cloned())
  }

  fn list(&self, kind: Kind) -> Result<Vec<Record>, StoreError> {
    Ok(self.records().values().filter(|r| r.kind == kind).cloned().collect())
  }

  fn create(&self, mut record: Record) -> Result<Record, StoreError> {
    let mut records = self.records();
    let key = record.key();
    if records.contains_key(&key) {
      return Err(StoreError::AlreadyExists { key });
    }
    record.resource_version = 1;
    records.insert(key, record.clone());
    Ok(record)
  }

  fn update(&self, mut record: Record) -> Result<Record, StoreError> {
    let mut records = self.records();
    let key = record.key();
    let Some(current) = records.get(&key) else {
      return Err(StoreError::NotFound { key });
    };
    if current.resource_version != record.resource_version {
      return Err(StoreError::Conflict {
        expected: record.resource_version,
        actual: current.resource_version,
        key,
      });
    }
    record.resource_version += 1;
    records.insert(key, record.clone());
    Ok(record)
  }

  fn delete(&self, kind: Kind, name: &str) -> Result<bool, StoreError> {
    let mut records = self.records();
    let root = ObjectKey::new(kind, name);
    if !records.contains_key(&root) {
      return Ok(false);
    }
    let all: Vec<Record> = records.values().cloned().collect();
    for key in owned_closure(&all, &root) {
      records.remove(&key);
    }
    records.remove(&root);
    Ok(true)
  }
}
