use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::PROJECT_META_FILE;
use crate::resource::Kind;

use super::types::{KindSpec, Manifest, ManifestSet};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to list manifest directory {path}: {source}")]
  ListDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{origin}, document {index}: {message}")]
  Document {
    origin: String,
    index: usize,
    message: String,
  },
}

/// Why a single document was skipped.
#[derive(Debug, Error)]
enum DocumentError {
  #[error("invalid YAML: {0}")]
  Yaml(#[source] serde_yaml::Error),

  #[error("not a manifest: {0}")]
  Envelope(#[source] serde_yaml::Error),

  #[error("unknown kind {0:?}")]
  UnknownKind(String),

  #[error("invalid {kind} spec: {source}")]
  Spec {
    kind: Kind,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("{0} has no metadata.name and none can be derived")]
  MissingName(Kind),
}

#[derive(Debug, Deserialize)]
struct Envelope {
  kind: String,
  #[serde(default)]
  metadata: Metadata,
  #[serde(default)]
  spec: serde_yaml::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
  #[serde(default)]
  name: Option<String>,
}

/// Result of one loader run.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
  pub manifests: ManifestSet,
  pub files: usize,
  pub decoded: usize,
  pub skipped: usize,
}

impl LoadReport {
  /// Decode every document in `content`, attributing log lines to `origin`.
  pub fn add_content(&mut self, content: &str, origin: &str) {
    for (index, document) in split_documents(content).into_iter().enumerate() {
      match self.add_document(&document) {
        Ok(true) => self.decoded += 1,
        Ok(false) => {}
        Err(e) => {
          warn!(file = origin, document = index, error = %e, "skipping manifest document");
          self.skipped += 1;
        }
      }
    }
  }

  /// Returns `Ok(false)` for documents with no content.
  fn add_document(&mut self, document: &str) -> Result<bool, DocumentError> {
    let value: serde_yaml::Value = serde_yaml::from_str(document).map_err(DocumentError::Yaml)?;
    if value.is_null() {
      return Ok(false);
    }
    let envelope: Envelope = serde_yaml::from_value(value).map_err(DocumentError::Envelope)?;
    let kind = Kind::from_manifest_kind(&envelope.kind).ok_or_else(|| DocumentError::UnknownKind(envelope.kind.clone()))?;

    let set = &mut self.manifests;
    match kind {
      Kind::Instance => push(&mut set.instances, envelope)?,
      Kind::Sequence => push(&mut set.sequences, envelope)?,
      Kind::Stage => push(&mut set.stages, envelope)?,
      Kind::Project => push(&mut set.projects, envelope)?,
      Kind::Service => push(&mut set.services, envelope)?,
      Kind::SequenceExecution => push(&mut set.sequence_executions, envelope)?,
      Kind::ScheduledExecution => push(&mut set.scheduled_executions, envelope)?,
      Kind::ServiceDeployment => push(&mut set.service_deployments, envelope)?,
      Kind::GitRepository | Kind::DeploymentContext => return Err(DocumentError::UnknownKind(envelope.kind)),
    }
    Ok(true)
  }
}

fn push<S: KindSpec>(bucket: &mut Vec<Manifest<S>>, envelope: Envelope) -> Result<(), DocumentError> {
  let spec: S = serde_yaml::from_value(envelope.spec).map_err(|source| DocumentError::Spec { kind: S::KIND, source })?;
  let name = envelope
    .metadata
    .name
    .filter(|n| !n.trim().is_empty())
    .or_else(|| spec.derived_name())
    .ok_or(DocumentError::MissingName(S::KIND))?;
  debug!(kind = %S::KIND, name = %name, "decoded manifest");
  bucket.push(Manifest { name, spec });
  Ok(())
}

/// Split a YAML stream on `---` document markers.
fn split_documents(content: &str) -> Vec<String> {
  let mut documents = Vec::new();
  let mut current = String::new();
  for line in content.lines() {
    let trimmed = line.trim_end();
    if trimmed == "---" || trimmed.starts_with("--- ") {
      documents.push(std::mem::take(&mut current));
      if let Some(rest) = trimmed.strip_prefix("--- ") {
        current.push_str(rest);
        current.push('\n');
      }
    } else if trimmed == "..." {
      documents.push(std::mem::take(&mut current));
    } else {
      current.push_str(line);
      current.push('\n');
    }
  }
  documents.push(current);
  documents.retain(|d| !d.trim().is_empty());
  documents
}

fn is_manifest_file(path: &Path) -> bool {
  let has_yaml_ext = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
  let reserved = path.file_name().and_then(|n| n.to_str()) == Some(PROJECT_META_FILE);
  has_yaml_ext && !reserved
}

/// Load every manifest directly under `dir` (non-recursive).
pub fn load_dir(dir: &Path) -> Result<LoadReport, ManifestError> {
  let entries = fs::read_dir(dir).map_err(|source| ManifestError::ListDir {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut paths: Vec<PathBuf> = entries
    .flatten()
    .map(|entry| entry.path())
    .filter(|path| path.is_file() && is_manifest_file(path))
    .collect();
  paths.sort();

  let mut report = LoadReport::default();
  for path in paths {
    report.files += 1;
    let origin = path.display().to_string();
    match fs::read_to_string(&path) {
      Ok(content) => report.add_content(&content, &origin),
      Err(e) => {
        warn!(file = %origin, error = %e, "skipping unreadable manifest file");
        report.skipped += 1;
      }
    }
  }

  info!(
    dir = %dir.display(),
    files = report.files,
    decoded = report.decoded,
    skipped = report.skipped,
    "loaded manifests"
  );
  Ok(report)
}

/// Load the manifests of a checked-out working tree.
pub fn load_manifests(worktree: &Path, base_dir: &str) -> Result<LoadReport, ManifestError> {
  load_dir(&worktree.join(base_dir))
}

/// Decode every document in `content` as kind `S`, failing on the first
/// document that is invalid or of another kind.
pub fn decode_kind<S: KindSpec>(content: &str, origin: &str) -> Result<Vec<Manifest<S>>, ManifestError> {
  let mut manifests = Vec::new();
  for (index, document) in split_documents(content).into_iter().enumerate() {
    let invalid = |e: DocumentError| ManifestError::Document {
      origin: origin.to_string(),
      index,
      message: e.to_string(),
    };
    let value: serde_yaml::Value = serde_yaml::from_str(&document).map_err(|e| invalid(DocumentError::Yaml(e)))?;
    if value.is_null() {
      continue;
    }
    let envelope: Envelope = serde_yaml::from_value(value).map_err(|e| invalid(DocumentError::Envelope(e)))?;
    if Kind::from_manifest_kind(&envelope.kind) != Some(S::KIND) {
      return Err(invalid(DocumentError::UnknownKind(envelope.kind)));
    }
    push(&mut manifests, envelope).map_err(invalid)?;
  }
  Ok(manifests)
}
