//! Git checkout of the source repository.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use super::types::GitCredentials;

#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to clone the repository.
  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The requested branch is not a valid reference name.
  #[error("invalid branch name '{branch}': {source}")]
  InvalidBranch {
    branch: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to check out the working tree.
  #[error("failed to checkout '{branch}': {source}")]
  Checkout {
    branch: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to resolve HEAD after checkout.
  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),
}

/// Produces a working tree for a source repository.
pub trait SourceFetcher: Send + Sync {
  /// Check out `branch` into the empty directory `dest` and return the
  /// commit id of its head.
  fn checkout(&self, credentials: &GitCredentials, branch: &str, dest: &Path) -> Result<String, FetchError>;
}

/// Clones with gix over http(s) or the local file protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct GixFetcher;

impl SourceFetcher for GixFetcher {
  fn checkout(&self, credentials: &GitCredentials, branch: &str, dest: &Path) -> Result<String, FetchError> {
    info!(url = %credentials.remote_uri, branch, path = %dest.display(), "cloning source repository");
    let url = credentials.authenticated_url();
    let repo = clone_branch(&url, &credentials.remote_uri, branch, dest)?;
    let commit = resolve_head(&repo)?;
    debug!(branch, commit = %commit, "resolved source head");
    Ok(commit)
  }
}

/// `display_url` is used in errors so embedded credentials never leak.
fn clone_branch(url: &str, display_url: &str, branch: &str, dest: &Path) -> Result<gix::Repository, FetchError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| FetchError::Clone {
    url: display_url.to_string(),
    source: e,
  };

  let prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;
  let mut prepared = prepared
    .with_ref_name(Some(branch))
    .map_err(|e| FetchError::InvalidBranch {
      branch: branch.to_string(),
      source: Box::new(e),
    })?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Checkout {
      branch: branch.to_string(),
      source: Box::new(e),
    })?;

  Ok(repo)
}

fn resolve_head(repo: &gix::Repository) -> Result<String, FetchError> {
  let mut head = repo.head().map_err(|e| FetchError::ResolveHead(e.to_string()))?;
  let commit = head
    .peel_to_commit()
    .map_err(|e| FetchError::ResolveHead(e.to_string()))?;
  Ok(commit.id.to_string())
}
