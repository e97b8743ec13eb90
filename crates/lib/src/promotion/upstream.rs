//! Git operations against the upstream configuration repository.
//!
//! The source repository is only ever read, so it is cloned with gix. The
//! upstream is written to: commits, annotated tags, tag deletion and pushes
//! go through libgit2.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{
  Cred, Direction, FetchOptions, IndexAddOption, ObjectType, Oid, PushOptions, RemoteCallbacks, Repository, Signature,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::DEFAULT_BRANCH;
use crate::manifest::ProjectSpec;
use crate::secrets::{SecretDecryptor, SecretError, reveal};

const REMOTE_NAME: &str = "origin";

#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("failed to clone '{url}' at '{branch}': {source}")]
  Clone {
    url: String,
    branch: String,
    #[source]
    source: git2::Error,
  },

  #[error("git {op} failed: {source}")]
  Git {
    op: &'static str,
    #[source]
    source: git2::Error,
  },

  #[error("push of '{refname}' rejected: {message}")]
  Rejected { refname: String, message: String },

  #[error("tag '{tag}' not found upstream")]
  TagNotFound { tag: String },

  #[error("upstream repository has no working tree")]
  Bare,
}

fn git(op: &'static str) -> impl FnOnce(git2::Error) -> UpstreamError {
  move |source| UpstreamError::Git { op, source }
}

/// Where to push promoted artifacts.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
  pub remote_uri: String,
  pub user: Option<String>,
  pub token: Option<String>,
  pub branch: String,
}

impl std::fmt::Debug for UpstreamConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UpstreamConfig")
      .field("remote_uri", &self.remote_uri)
      .field("user", &self.user)
      .field("token", &self.token.as_ref().map(|_| "<redacted>"))
      .field("branch", &self.branch)
      .finish()
  }
}

impl UpstreamConfig {
  pub fn new(remote_uri: impl Into<String>, branch: impl Into<String>) -> Self {
    Self {
      remote_uri: remote_uri.into(),
      user: None,
      token: None,
      branch: branch.into(),
    }
  }

  /// Upstream settings from a Project record. `None` when the project has
  /// no repository configured.
  pub fn from_project<D: SecretDecryptor + ?Sized>(
    spec: &ProjectSpec,
    decryptor: &D,
  ) -> Result<Option<Self>, SecretError> {
    let Some(remote_uri) = spec.repository.as_deref().filter(|r| !r.is_empty()) else {
      return Ok(None);
    };
    let token = match spec.password.as_deref().filter(|p| !p.is_empty()) {
      Some(password) => Some(reveal(password, decryptor)?),
      None => None,
    };
    let branch = spec
      .default_branch
      .as_deref()
      .filter(|b| !b.is_empty())
      .unwrap_or(DEFAULT_BRANCH);

    Ok(Some(Self {
      remote_uri: remote_uri.to_string(),
      user: spec.username.clone().filter(|u| !u.is_empty()),
      token,
      branch: branch.to_string(),
    }))
  }

  /// Same repository, different branch.
  pub fn at_branch(&self, branch: &str) -> Self {
    Self {
      branch: branch.to_string(),
      ..self.clone()
    }
  }
}

/// A clone of the upstream repository checked out at one branch.
pub struct Upstream {
  config: UpstreamConfig,
  repo: Repository,
  workdir: PathBuf,
}

impl Upstream {
  /// Clone `config.branch` into the empty directory `dest`.
  pub fn clone_into(config: &UpstreamConfig, dest: &Path) -> Result<Self, UpstreamError> {
    info!(url = %config.remote_uri, branch = %config.branch, "cloning upstream");
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(credential_callbacks(config));

    let repo = RepoBuilder::new()
      .branch(&config.branch)
      .fetch_options(fetch)
      .clone(&config.remote_uri, dest)
      .map_err(|source| UpstreamError::Clone {
        url: config.remote_uri.clone(),
        branch: config.branch.clone(),
        source,
      })?;

    let workdir = repo.workdir().ok_or(UpstreamError::Bare)?.to_path_buf();
    Ok(Self {
      config: config.clone(),
      repo,
      workdir,
    })
  }

  pub fn workdir(&self) -> &Path {
    &self.workdir
  }

  pub fn branch(&self) -> &str {
    &self.config.branch
  }

  pub fn repository(&self) -> &Repository {
    &self.repo
  }

  pub fn head_commit(&self) -> Result<Oid, UpstreamError> {
    let head = self.repo.head().map_err(git("head"))?;
    Ok(head.peel_to_commit().map_err(git("head"))?.id())
  }

  /// Whether `tag` exists locally or on the remote.
  pub fn tag_exists(&self, tag: &str) -> Result<bool, UpstreamError> {
    let refname = format!("refs/tags/{tag}");
    if self.repo.find_reference(&refname).is_ok() {
      return Ok(true);
    }

    let mut remote = self.repo.find_remote(REMOTE_NAME).map_err(git("find remote"))?;
    let connection = remote
      .connect_auth(Direction::Fetch, Some(self.callbacks()), None)
      .map_err(git("connect"))?;
    let exists = connection
      .list()
      .map_err(git("list refs"))?
      .iter()
      .any(|head| head.name() == refname);
    Ok(exists)
  }

  /// Stage every change in the working tree, deletions included.
  pub fn stage_all(&self) -> Result<Oid, UpstreamError> {
    let mut index = self.repo.index().map_err(git("index"))?;
    index
      .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
      .map_err(git("add"))?;
    index.update_all(["*"].iter(), None).map_err(git("add"))?;
    index.write().map_err(git("write index"))?;
    index.write_tree().map_err(git("write tree"))
  }

  /// Commit the staged tree on the current branch unless it matches HEAD.
  pub fn commit_if_changed(&self, tree: Oid, message: &str, name: &str, email: &str) -> Result<Option<Oid>, UpstreamError> {
    let parent = self
      .repo
      .head()
      .and_then(|head| head.peel_to_commit())
      .map_err(git("head"))?;
    if parent.tree_id() == tree {
      debug!(branch = %self.config.branch, "tree unchanged, nothing to commit");
      return Ok(None);
    }

    let tree = self.repo.find_tree(tree).map_err(git("find tree"))?;
    let signature = Signature::now(name, email).map_err(git("signature"))?;
    let oid = self
      .repo
      .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
      .map_err(git("commit"))?;
    debug!(commit = %oid, "committed");
    Ok(Some(oid))
  }

  /// Create an annotated tag on `target`, replacing a local tag of the same name.
  pub fn create_tag(&self, tag: &str, target: Oid, message: &str, name: &str, email: &str) -> Result<(), UpstreamError> {
    let object = self.repo.find_object(target, Some(ObjectType::Commit)).map_err(git("find commit"))?;
    let signature = Signature::now(name, email).map_err(git("signature"))?;
    self
      .repo
      .tag(tag, &object, &signature, message, true)
      .map_err(git("tag"))?;
    Ok(())
  }

  /// Delete `tag` on the remote. The local tag is left alone.
  pub fn delete_remote_tag(&self, tag: &str) -> Result<(), UpstreamError> {
    info!(tag, "deleting upstream tag");
    self.push(&[format!(":refs/tags/{tag}")])
  }

  pub fn push_branch(&self) -> Result<(), UpstreamError> {
    let branch = &self.config.branch;
    info!(branch = %branch, "pushing branch");
    self.push(&[format!("refs/heads/{branch}:refs/heads/{branch}")])
  }

  pub fn push_tag(&self, tag: &str) -> Result<(), UpstreamError> {
    info!(tag, "pushing tag");
    self.push(&[format!("refs/tags/{tag}:refs/tags/{tag}")])
  }

  /// Fetch `tag` from the remote and return the commit it points at.
  pub fn fetch_tag(&self, tag: &str) -> Result<Oid, UpstreamError> {
    let refname = format!("refs/tags/{tag}");
    let mut remote = self.repo.find_remote(REMOTE_NAME).map_err(git("find remote"))?;
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(self.callbacks());
    remote
      .fetch(&[format!("+{refname}:{refname}")], Some(&mut fetch), None)
      .map_err(git("fetch"))?;

    let reference = self
      .repo
      .find_reference(&refname)
      .map_err(|_| UpstreamError::TagNotFound { tag: tag.to_string() })?;
    Ok(reference.peel_to_commit().map_err(git("peel tag"))?.id())
  }

  fn push(&self, refspecs: &[String]) -> Result<(), UpstreamError> {
    let rejected: RefCell<Option<(String, String)>> = RefCell::new(None);
    {
      let mut callbacks = self.callbacks();
      callbacks.push_update_reference(|refname, status| {
        if let Some(message) = status {
          rejected.borrow_mut().get_or_insert((refname.to_string(), message.to_string()));
        }
        Ok(())
      });
      let mut options = PushOptions::new();
      options.remote_callbacks(callbacks);

      let mut remote = self.repo.find_remote(REMOTE_NAME).map_err(git("find remote"))?;
      let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
      remote.push(&specs, Some(&mut options)).map_err(git("push"))?;
    }

    match rejected.into_inner() {
      Some((refname, message)) => Err(UpstreamError::Rejected { refname, message }),
      None => Ok(()),
    }
  }

  fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
    credential_callbacks(&self.config)
  }
}

/// Credentials callback that offers the configured user and token once.
fn credential_callbacks<'a>(config: &UpstreamConfig) -> RemoteCallbacks<'a> {
  let user = config.user.clone();
  let token = config.token.clone();
  let mut attempted = false;

  let mut callbacks = RemoteCallbacks::new();
  callbacks.credentials(move |_url, username_from_url, _allowed| {
    if attempted {
      return Err(git2::Error::from_str("upstream rejected the configured credentials"));
    }
    attempted = true;
    match &token {
      Some(token) => {
        let user = user.as_deref().or(username_from_url).unwrap_or("git");
        Cred::userpass_plaintext(user, token)
      }
      None => Cred::default(),
    }
  });
  callbacks
}
