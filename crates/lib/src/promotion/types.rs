use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{ARTIFACT_BASE_DIR, ARTIFACT_STAGES_DIR, DEFAULT_CONFIG_VERSION};

/// Paths of the artifact tree inside a checked-out source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
  worktree: PathBuf,
  root: PathBuf,
}

impl ArtifactLayout {
  pub fn new(worktree: &Path, base_dir: &str) -> Self {
    Self {
      worktree: worktree.to_path_buf(),
      root: worktree.join(base_dir),
    }
  }

  /// Root of the source working tree. Chart directories resolve against it.
  pub fn worktree(&self) -> &Path {
    &self.worktree
  }

  /// `<worktree>/<base_dir>`
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn base_root(&self) -> PathBuf {
    self.root.join(ARTIFACT_BASE_DIR)
  }

  pub fn stages_root(&self) -> PathBuf {
    self.root.join(ARTIFACT_STAGES_DIR)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProjectMetaFile {
  #[serde(default)]
  pub spec: ProjectMetaSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProjectMetaSpec {
  #[serde(default)]
  pub project: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ArtifactMetadataFile {
  #[serde(default)]
  pub spec: ArtifactMetadata,
}

/// Contents of `base/<service>/metadata.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
  #[serde(default)]
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub config_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chart_dir: Option<String>,
  #[serde(default)]
  pub overwrite_tag: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project: Option<String>,
}

impl ArtifactMetadata {
  pub fn config_version(&self) -> &str {
    self
      .config_version
      .as_deref()
      .filter(|v| !v.is_empty())
      .unwrap_or(DEFAULT_CONFIG_VERSION)
  }
}

/// A service directory under `base/` that carries metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactService {
  pub name: String,
  pub path: PathBuf,
  pub metadata: ArtifactMetadata,
}

impl ArtifactService {
  pub fn tag(&self) -> String {
    tag_name(&self.name, &self.metadata.version, Some(self.metadata.config_version()))
  }
}

/// A stage directory under `stages/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOverlay {
  pub name: String,
  pub path: PathBuf,
}

impl StageOverlay {
  /// Overlay directory for `service`, whether or not it exists.
  pub fn service_dir(&self, service: &str) -> PathBuf {
    self.path.join(service)
  }
}

/// `<service>-<version>-<configVersion>`, with the config version
/// defaulting to `"0"`.
pub fn tag_name(service: &str, version: &str, config_version: Option<&str>) -> String {
  let config_version = config_version.filter(|v| !v.is_empty()).unwrap_or(DEFAULT_CONFIG_VERSION);
  format!("{service}-{version}-{config_version}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotedTag {
  pub service: String,
  pub tag: String,
  pub commit: String,
  pub replaced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
  pub project: String,
  pub promoted: Vec<PromotedTag>,
  /// Tags left alone because they exist and may not be overwritten.
  pub skipped: Vec<String>,
  /// Service directories whose metadata could not be used.
  pub rejected: Vec<String>,
}
