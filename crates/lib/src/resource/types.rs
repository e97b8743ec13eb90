//! Resource record types.
//!
//! A [`Record`] is the stored form of every resource kind: identity, the
//! desired spec, observed status, annotations and an optional owner.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::consts::LAST_APPLIED_HASH_ANNOTATION;
use crate::util::hash::SpecHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
  GitRepository,
  Instance,
  Sequence,
  Stage,
  Project,
  Service,
  SequenceExecution,
  ScheduledExecution,
  ServiceDeployment,
  DeploymentContext,
}

impl Kind {
  pub const ALL: [Kind; 10] = [
    Kind::GitRepository,
    Kind::Instance,
    Kind::Sequence,
    Kind::Stage,
    Kind::Project,
    Kind::Service,
    Kind::SequenceExecution,
    Kind::ScheduledExecution,
    Kind::ServiceDeployment,
    Kind::DeploymentContext,
  ];

  /// Manifest `kind` string.
  pub fn as_str(self) -> &'static str {
    match self {
      Kind::GitRepository => "KeptnGitRepository",
      Kind::Instance => "KeptnInstance",
      Kind::Sequence => "KeptnSequence",
      Kind::Stage => "KeptnStage",
      Kind::Project => "KeptnProject",
      Kind::Service => "KeptnService",
      Kind::SequenceExecution => "KeptnSequenceExecution",
      Kind::ScheduledExecution => "KeptnScheduledExec",
      Kind::ServiceDeployment => "KeptnServiceDeployment",
      Kind::DeploymentContext => "KeptnDeploymentContext",
    }
  }

  /// Human-readable name used in events.
  pub fn label(self) -> &'static str {
    match self {
      Kind::GitRepository => "git repository",
      Kind::Instance => "instance",
      Kind::Sequence => "sequence",
      Kind::Stage => "stage",
      Kind::Project => "project",
      Kind::Service => "service",
      Kind::SequenceExecution => "sequence execution",
      Kind::ScheduledExecution => "scheduled execution",
      Kind::ServiceDeployment => "service deployment",
      Kind::DeploymentContext => "deployment context",
    }
  }

  pub fn from_manifest_kind(kind: &str) -> Option<Kind> {
    Kind::ALL.into_iter().find(|k| k.as_str() == kind)
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identity of a record. Also used as an owner reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
  pub kind: Kind,
  pub name: String,
}

impl ObjectKey {
  pub fn new(kind: Kind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
    }
  }
}

impl fmt::Display for ObjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.kind, self.name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  pub kind: Kind,
  pub name: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub owner: Option<ObjectKey>,
  pub spec: Value,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub status: Value,
  /// Optimistic concurrency token. Zero until the record is first stored.
  #[serde(default)]
  pub resource_version: u64,
}

impl Record {
  pub fn new(kind: Kind, name: impl Into<String>, spec: Value) -> Self {
    Self {
      kind,
      name: name.into(),
      annotations: BTreeMap::new(),
      owner: None,
      spec,
      status: Value::Null,
      resource_version: 0,
    }
  }

  pub fn with_owner(mut self, owner: ObjectKey) -> Self {
    self.owner = Some(owner);
    self
  }

  pub fn key(&self) -> ObjectKey {
    ObjectKey::new(self.kind, self.name.clone())
  }

  pub fn last_applied_hash(&self) -> Option<&str> {
    self.annotations.get(LAST_APPLIED_HASH_ANNOTATION).map(String::as_str)
  }

  pub fn set_last_applied_hash(&mut self, hash: &SpecHash) {
    self
      .annotations
      .insert(LAST_APPLIED_HASH_ANNOTATION.to_string(), hash.0.clone());
  }

  pub fn spec_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
    serde_json::from_value(self.spec.clone()).map_err(|source| StoreError::Decode {
      key: self.key(),
      source,
    })
  }

  /// Decode the status, treating an absent status as the default.
  pub fn status_as<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
    if self.status.is_null() {
      return Ok(T::default());
    }
    serde_json::from_value(self.status.clone()).map_err(|source| StoreError::Decode {
      key: self.key(),
      source,
    })
  }

  pub fn set_status<T: Serialize>(&mut self, status: &T) -> Result<(), StoreError> {
    self.status = serde_json::to_value(status).map_err(|source| StoreError::Encode {
      key: self.key(),
      source,
    })?;
    Ok(())
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{key} already exists")]
  AlreadyExists { key: ObjectKey },

  #[error("{key} not found")]
  NotFound { key: ObjectKey },

  #[error("conflict writing {key}: expected version {expected}, found {actual}")]
  Conflict { key: ObjectKey, expected: u64, actual: u64 },

  #[error("failed to decode {key}: {source}")]
  Decode {
    key: ObjectKey,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode {key}: {source}")]
  Encode {
    key: ObjectKey,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to create store directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to lock store at {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl StoreError {
  pub fn is_conflict(&self) -> bool {
    matches!(self, StoreError::Conflict { .. } | StoreError::AlreadyExists { .. })
  }
}
