//! Idempotent upsert of desired specs.
//!
//! [`sync_resource`] is the single create-or-update path every manifest kind
//! goes through. A record carries the structural hash of the spec last
//! written in its `keptn.sh/last-applied-hash` annotation; the record is only
//! rewritten when the desired spec hashes differently.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::MAX_CONFLICT_RETRIES;
use crate::events::EventRecorder;
use crate::manifest::{KindSpec, Manifest};
use crate::resource::{Kind, ObjectKey, Record, ResourceStore, StoreError};
use crate::util::hash::{HashError, structural_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
  Created,
  Updated,
  Unchanged,
}

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("failed to serialize {key} spec: {source}")]
  Serialize {
    key: ObjectKey,
    #[source]
    source: HashError,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Create `kind/name` if absent, otherwise update it if `desired` changed.
///
/// The owner is only set on creation. Version conflicts and creation races
/// are retried from a fresh read.
pub fn sync_resource<S, T>(
  store: &S,
  kind: Kind,
  name: &str,
  desired: &T,
  owner: &ObjectKey,
) -> Result<SyncOutcome, SyncError>
where
  S: ResourceStore + ?Sized,
  T: Serialize + ?Sized,
{
  upsert(store, kind, name, desired, Some(owner))
}

/// Like [`sync_resource`] for records nothing owns, such as registered
/// sources.
pub fn sync_root<S, T>(store: &S, kind: Kind, name: &str, desired: &T) -> Result<SyncOutcome, SyncError>
where
  S: ResourceStore + ?Sized,
  T: Serialize + ?Sized,
{
  upsert(store, kind, name, desired, None)
}

fn upsert<S, T>(
  store: &S,
  kind: Kind,
  name: &str,
  desired: &T,
  owner: Option<&ObjectKey>,
) -> Result<SyncOutcome, SyncError>
where
  S: ResourceStore + ?Sized,
  T: Serialize + ?Sized,
{
  let key = ObjectKey::new(kind, name);
  let serialize_err = |source| SyncError::Serialize {
    key: key.clone(),
    source,
  };
  let hash = structural_hash(desired).map_err(serialize_err)?;
  let spec = serde_json::to_value(desired).map_err(serialize_err)?;

  let mut attempt = 1;
  loop {
    let result = match store.get(kind, name)? {
      None => {
        let mut record = Record::new(kind, name, spec.clone());
        record.owner = owner.cloned();
        record.set_last_applied_hash(&hash);
        store.create(record).map(|_| SyncOutcome::Created)
      }
      Some(existing) if existing.last_applied_hash() == Some(hash.as_str()) => {
        return Ok(SyncOutcome::Unchanged);
      }
      Some(mut existing) => {
        existing.spec = spec.clone();
        existing.set_last_applied_hash(&hash);
        store.update(existing).map(|_| SyncOutcome::Updated)
      }
    };

    match result {
      Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
        debug!(key = %key, attempt, "write raced, retrying");
        attempt += 1;
      }
      other => return other.map_err(SyncError::from),
    }
  }
}

/// Outcome of applying one kind's bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindSummary {
  /// Set when the batch stopped because a record was created.
  pub created: Option<ObjectKey>,
  pub updated: Vec<ObjectKey>,
  pub unchanged: usize,
}

/// Upsert manifests of one kind in order, stopping at the first creation.
///
/// Creations and updates are reported as events on `owner`, then handed to
/// `on_change` for any kind-specific follow-up.
pub fn apply_manifests<S, T, F>(
  store: &S,
  recorder: &dyn EventRecorder,
  owner: &ObjectKey,
  manifests: &[Manifest<T>],
  mut on_change: F,
) -> Result<KindSummary, SyncError>
where
  S: ResourceStore + ?Sized,
  T: KindSpec,
  F: FnMut(&Manifest<T>, SyncOutcome),
{
  let mut summary = KindSummary::default();
  let label = T::KIND.label();

  for manifest in manifests {
    let outcome = sync_resource(store, T::KIND, &manifest.name, &manifest.spec, owner)?;
    let key = ObjectKey::new(T::KIND, manifest.name.clone());
    match outcome {
      SyncOutcome::Created => {
        info!(key = %key, "created");
        recorder.normal(owner, "Created", format!("Created {label} {}", manifest.name));
        on_change(manifest, outcome);
        summary.created = Some(key);
        return Ok(summary);
      }
      SyncOutcome::Updated => {
        info!(key = %key, "updated");
        recorder.normal(
          owner,
          "Updated",
          format!("Updated {label} {} (Reason: {} changed)", manifest.name, capitalize(label)),
        );
        on_change(manifest, outcome);
        summary.updated.push(key);
      }
      SyncOutcome::Unchanged => summary.unchanged += 1,
    }
  }

  Ok(summary)
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
