//! Rolls a promoted artifact out to a stage branch.
//!
//! The stage branch holds one directory per service. Delivery replaces that
//! directory with the tagged base configuration, applies the stage overlay
//! on top, and writes merged helm values with the image version filled in.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::{ObjectType, Repository, Tree};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::merge::{MergeError, merge_values_str};
use super::types::tag_name;
use super::upstream::{Upstream, UpstreamConfig, UpstreamError};
use crate::consts::{ARTIFACT_BASE_DIR, ARTIFACT_STAGES_DIR, IMAGE_VERSION_PLACEHOLDER, STAGE_AUTHOR_EMAIL, STAGE_AUTHOR_NAME};
use crate::util::fs::{FsError, remove_dir_if_exists};

const SYMLINK_MODE: i32 = 0o120000;

#[derive(Debug, Error)]
pub enum StageDeliveryError {
  #[error("failed to create stage working directory: {0}")]
  Workdir(#[source] io::Error),

  #[error(transparent)]
  Upstream(#[from] UpstreamError),

  #[error("failed to read '{path}' from tag: {source}")]
  Extract {
    path: String,
    #[source]
    source: git2::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Merge(#[from] MergeError),
}

/// What to roll out where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDelivery {
  pub stage: String,
  pub service: String,
  pub version: String,
  pub config_version: Option<String>,
}

impl StageDelivery {
  pub fn tag(&self) -> String {
    tag_name(&self.service, &self.version, self.config_version.as_deref())
  }
}

/// Deliver a promoted artifact to its stage branch and push it.
///
/// Returns the new stage commit, or `None` when the branch already had the
/// delivered content.
pub fn deliver_to_stage(upstream: &UpstreamConfig, delivery: &StageDelivery) -> Result<Option<String>, StageDeliveryError> {
  let StageDelivery { stage, service, version, .. } = delivery;
  let tag = delivery.tag();

  let workdir = tempfile::Builder::new()
    .prefix("kgitops-stage-")
    .tempdir()
    .map_err(StageDeliveryError::Workdir)?;
  let repo = Upstream::clone_into(&upstream.at_branch(stage), workdir.path())?;
  let tagged = repo.fetch_tag(&tag)?;
  let git = repo.repository();
  let tree = git
    .find_commit(tagged)
    .and_then(|commit| commit.tree())
    .map_err(|source| StageDeliveryError::Extract { path: tag.clone(), source })?;

  let dest = repo.workdir().join(service);
  remove_dir_if_exists(&dest)?;

  let base_path = format!("{ARTIFACT_BASE_DIR}/{service}");
  let overlay_path = format!("{ARTIFACT_STAGES_DIR}/{stage}/{service}");
  let copied = extract_subtree(git, &tree, &base_path, &dest)? + extract_subtree(git, &tree, &overlay_path, &dest)?;
  debug!(service = %service, stage = %stage, files = copied, "extracted artifact");

  let values_rel = format!("helm/{service}/values.yaml");
  let base_values = read_tree_file(git, &tree, &format!("{base_path}/{values_rel}"))?;
  let overlay_values = read_tree_file(git, &tree, &format!("{overlay_path}/{values_rel}"))?;
  match merge_values_str(base_values.as_deref(), overlay_values.as_deref()) {
    Ok(merged) => {
      let rendered = merged.replace(IMAGE_VERSION_PLACEHOLDER, version);
      write_file(&dest.join(&values_rel), &rendered)?;
    }
    Err(MergeError::NoValues) => warn!(service = %service, stage = %stage, "no helm values to merge"),
    Err(e) => return Err(e.into()),
  }

  let staged = repo.stage_all()?;
  let message = format!("Updated to version {version}");
  let Some(commit) = repo.commit_if_changed(staged, &message, STAGE_AUTHOR_NAME, STAGE_AUTHOR_EMAIL)? else {
    info!(service = %service, stage = %stage, version = %version, "stage already up to date");
    return Ok(None);
  };
  repo.push_branch()?;
  info!(service = %service, stage = %stage, version = %version, commit = %commit, "delivered to stage");
  Ok(Some(commit.to_string()))
}

/// Write the blobs under `path` in `tree` into `dest`. A missing path
/// extracts nothing.
fn extract_subtree(repo: &Repository, tree: &Tree<'_>, path: &str, dest: &Path) -> Result<usize, StageDeliveryError> {
  let entry = match tree.get_path(Path::new(path)) {
    Ok(entry) => entry,
    Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(0),
    Err(source) => {
      return Err(StageDeliveryError::Extract {
        path: path.to_string(),
        source,
      });
    }
  };
  let subtree = repo
    .find_tree(entry.id())
    .map_err(|source| StageDeliveryError::Extract { path: path.to_string(), source })?;
  write_tree(repo, &subtree, dest)
}

fn write_tree(repo: &Repository, tree: &Tree<'_>, dest: &Path) -> Result<usize, StageDeliveryError> {
  let mut written = 0;
  for entry in tree.iter() {
    let Some(name) = entry.name() else { continue };
    let target = dest.join(name);
    let extract_err = |source| StageDeliveryError::Extract {
      path: target.display().to_string(),
      source,
    };
    match entry.kind() {
      Some(ObjectType::Tree) => {
        let subtree = repo.find_tree(entry.id()).map_err(extract_err)?;
        written += write_tree(repo, &subtree, &target)?;
      }
      Some(ObjectType::Blob) if entry.filemode() != SYMLINK_MODE => {
        let blob = repo.find_blob(entry.id()).map_err(extract_err)?;
        write_bytes(&target, blob.content())?;
        written += 1;
      }
      _ => {}
    }
  }
  Ok(written)
}

fn read_tree_file(repo: &Repository, tree: &Tree<'_>, path: &str) -> Result<Option<String>, StageDeliveryError> {
  let entry = match tree.get_path(Path::new(path)) {
    Ok(entry) => entry,
    Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
    Err(source) => {
      return Err(StageDeliveryError::Extract {
        path: path.to_string(),
        source,
      });
    }
  };
  let blob = repo
    .find_blob(entry.id())
    .map_err(|source| StageDeliveryError::Extract { path: path.to_string(), source })?;
  Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
}

fn write_file(path: &Path, content: &str) -> Result<(), StageDeliveryError> {
  write_bytes(path, content.as_bytes())
}

fn write_bytes(path: &Path, content: &[u8]) -> Result<(), StageDeliveryError> {
  let write_err = |source| StageDeliveryError::Write {
    path: path.to_path_buf(),
    source,
  };
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }
  fs::write(path, content).map_err(write_err)
}
