//! The resource store.
//!
//! Every resource kind is persisted as a [`Record`] behind the
//! [`ResourceStore`] trait. Writes use optimistic concurrency: `update`
//! succeeds only when the caller's `resource_version` matches the stored one,
//! so read-modify-write cycles never lose a concurrent update. Deleting a
//! record cascades to every record it owns.

mod file;
mod memory;
mod types;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use types::{Kind, ObjectKey, Record, StoreError};

use tracing::debug;

use crate::consts::MAX_CONFLICT_RETRIES;

pub trait ResourceStore: Send + Sync {
  fn get(&self, kind: Kind, name: &str) -> Result<Option<Record>, StoreError>;

  /// All records of `kind`, sorted by name.
  fn list(&self, kind: Kind) -> Result<Vec<Record>, StoreError>;

  /// Store a new record. Fails with `AlreadyExists` if the identity is taken.
  fn create(&self, record: Record) -> Result<Record, StoreError>;

  /// Replace an existing record if its `resource_version` is current.
  fn update(&self, record: Record) -> Result<Record, StoreError>;

  /// Delete a record and everything it owns. Returns whether it existed.
  fn delete(&self, kind: Kind, name: &str) -> Result<bool, StoreError>;
}

/// Read-modify-write a record, retrying on version conflicts.
pub fn modify<S, F>(store: &S, kind: Kind, name: &str, mut mutate: F) -> Result<Record, StoreError>
where
  S: ResourceStore + ?Sized,
  F: FnMut(&mut Record) -> Result<(), StoreError>,
{
  let mut attempt = 1;
  loop {
    let Some(mut record) = store.get(kind, name)? else {
      return Err(StoreError::NotFound {
        key: ObjectKey::new(kind, name),
      });
    };
    mutate(&mut record)?;

    match store.update(record) {
      Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
        debug!(kind = %kind, name, attempt, "version conflict, retrying");
        attempt += 1;
      }
      result => return result,
    }
  }
}

/// Keys of every record transitively owned by `root`, children first.
fn owned_closure(records: &[Record], root: &ObjectKey) -> Vec<ObjectKey> {
  let mut found = Vec::new();
  let mut frontier = vec![root.clone()];
  while let Some(owner) = frontier.pop() {
    for record in records {
      if record.owner.as_ref() == Some(&owner) && !found.contains(&record.key()) {
        found.push(record.key());
        frontier.push(record.key());
      }
    }
  }
  found.reverse();
  found
}
