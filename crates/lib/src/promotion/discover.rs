//! Scans a source working tree for promotable artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
  ArtifactLayout, ArtifactMetadataFile, ArtifactService, ProjectMetaFile, StageOverlay, tag_name,
};
use crate::consts::{ARTIFACT_BASE_DIR, ARTIFACT_META_FILE, PROJECT_META_FILE};
use crate::util::fs::{FsError, list_subdirs};

#[derive(Debug, Error)]
pub enum DiscoverError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error(transparent)]
  Fs(#[from] FsError),
}

/// A service directory that has metadata but cannot be promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedService {
  pub name: String,
  pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
  pub services: Vec<ArtifactService>,
  pub rejected: Vec<RejectedService>,
}

/// Project named by `projectmeta.yaml`, looked up at the artifact root and
/// then under `base/`. `None` when neither file exists or it names no project.
pub fn read_project_meta(layout: &ArtifactLayout) -> Result<Option<String>, DiscoverError> {
  let candidates = [
    layout.root().join(PROJECT_META_FILE),
    layout.root().join(ARTIFACT_BASE_DIR).join(PROJECT_META_FILE),
  ];

  for path in candidates {
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(source) => return Err(DiscoverError::Read { path, source }),
    };
    let meta: ProjectMetaFile =
      serde_yaml::from_str(&content).map_err(|source| DiscoverError::Parse { path: path.clone(), source })?;
    let project = meta.spec.project.trim().to_string();
    debug!(path = %path.display(), project = %project, "read project metadata");
    return Ok((!project.is_empty()).then_some(project));
  }
  Ok(None)
}

/// Service directories under `base/` that contain `metadata.yaml`, sorted by
/// name. Directories without metadata are not artifacts and are ignored.
pub fn discover_services(layout: &ArtifactLayout) -> Result<Discovery, DiscoverError> {
  let mut discovery = Discovery::default();

  for (name, path) in list_subdirs(&layout.base_root())? {
    let meta_path = path.join(ARTIFACT_META_FILE);
    let content = match fs::read_to_string(&meta_path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(service = %name, "no metadata, not an artifact");
        continue;
      }
      Err(source) => return Err(DiscoverError::Read { path: meta_path, source }),
    };

    let metadata = match serde_yaml::from_str::<ArtifactMetadataFile>(&content) {
      Ok(file) => file.spec,
      Err(e) => {
        warn!(service = %name, error = %e, "invalid artifact metadata");
        discovery.rejected.push(RejectedService {
          name,
          reason: format!("invalid metadata: {e}"),
        });
        continue;
      }
    };

    if let Some(reason) = validate_version(&name, &metadata.version, metadata.config_version()) {
      warn!(service = %name, version = %metadata.version, "{reason}");
      discovery.rejected.push(RejectedService { name, reason });
      continue;
    }

    discovery.services.push(ArtifactService { name, path, metadata });
  }

  Ok(discovery)
}

/// Stage directories under `stages/`, sorted by name.
pub fn discover_stages(layout: &ArtifactLayout) -> Result<Vec<StageOverlay>, DiscoverError> {
  Ok(
    list_subdirs(&layout.stages_root())?
      .into_iter()
      .map(|(name, path)| StageOverlay { name, path })
      .collect(),
  )
}

fn validate_version(service: &str, version: &str, config_version: &str) -> Option<String> {
  if version.trim().is_empty() {
    return Some("metadata has no version".to_string());
  }
  let tag = tag_name(service, version, Some(config_version));
  if !git2::Reference::is_valid_name(&format!("refs/tags/{tag}")) {
    return Some(format!("'{tag}' is not a valid tag name"));
  }
  None
}
