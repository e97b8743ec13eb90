//! File store behavior seen through the public API.

use serde_json::json;
use tempfile::TempDir;

use kgitops_lib::resource::{FileStore, Kind, ObjectKey, Record, ResourceStore, StoreError, modify};
use kgitops_lib::sync::{SyncOutcome, sync_resource};

#[test]
fn records_survive_reopening() {
  let temp = TempDir::new().unwrap();
  let owner = ObjectKey::new(Kind::GitRepository, "shop");
  {
    let store = FileStore::new(temp.path().to_path_buf());
    let outcome = sync_resource(&store, Kind::Stage, "dev", &json!({ "project": "shop" }), &owner).unwrap();
    assert_eq!(outcome, SyncOutcome::Created);
  }

  let store = FileStore::new(temp.path().to_path_buf());
  let record = store.get(Kind::Stage, "dev").unwrap().unwrap();
  assert_eq!(record.owner, Some(owner.clone()));
  assert!(record.last_applied_hash().is_some());
  assert_eq!(
    sync_resource(&store, Kind::Stage, "dev", &json!({ "project": "shop" }), &owner).unwrap(),
    SyncOutcome::Unchanged
  );
}

#[test]
fn stale_write_is_a_conflict() {
  let temp = TempDir::new().unwrap();
  let store = FileStore::new(temp.path().to_path_buf());
  store.create(Record::new(Kind::Project, "shop", json!({}))).unwrap();

  let stale = store.get(Kind::Project, "shop").unwrap().unwrap();
  modify(&store, Kind::Project, "shop", |record| {
    record.spec = json!({ "repository": "https://git.example.com/upstream.git" });
    Ok(())
  })
  .unwrap();

  let err = store.update(stale).unwrap_err();
  assert!(err.is_conflict());
  assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn deleting_a_source_removes_what_it_owns() {
  let temp = TempDir::new().unwrap();
  let store = FileStore::new(temp.path().to_path_buf());
  let source = ObjectKey::new(Kind::GitRepository, "shop");
  store
    .create(Record::new(Kind::GitRepository, "shop", json!({ "repository": "x" })))
    .unwrap();
  sync_resource(&store, Kind::Project, "shop", &json!({}), &source).unwrap();
  sync_resource(&store, Kind::Stage, "dev", &json!({ "project": "shop" }), &source).unwrap();

  assert!(store.delete(Kind::GitRepository, "shop").unwrap());
  assert!(store.list(Kind::Project).unwrap().is_empty());
  assert!(store.list(Kind::Stage).unwrap().is_empty());
}
