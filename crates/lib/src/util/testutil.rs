//! Test utilities for kgitops-lib.
//!
//! Builds local git repositories so upstream operations can be exercised
//! without network access.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Oid, PushOptions, Repository, RepositoryInitOptions, Signature};

/// Write `files` (relative path, content) under `root`.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }
}

/// Stage everything (including deletions) and commit on the current branch.
pub fn commit_all(repo: &Repository, message: &str) -> Oid {
  let mut index = repo.index().unwrap();
  index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
  index.update_all(["*"].iter(), None).unwrap();
  index.write().unwrap();
  let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
  let sig = Signature::now("Test", "test@example.com").unwrap();
  let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
  let parents: Vec<&git2::Commit> = parent.iter().collect();
  repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

/// Working repository on `main` with one commit of `files`.
pub fn init_repo(dir: &Path, files: &[(&str, &str)]) -> Repository {
  let mut opts = RepositoryInitOptions::new();
  opts.initial_head("main");
  let repo = Repository::init_opts(dir, &opts).unwrap();
  write_files(dir, files);
  commit_all(&repo, "initial");
  repo
}

/// Push `branch` from `repo` to the bare repository at `remote`.
pub fn push_branch(repo: &Repository, remote: &Path, branch: &str) {
  let mut origin = match repo.find_remote("origin") {
    Ok(r) => r,
    Err(_) => repo.remote("origin", remote.to_str().unwrap()).unwrap(),
  };
  let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
  origin.push(&[refspec.as_str()], Some(&mut PushOptions::new())).unwrap();
}

/// Bare repository seeded with `files` on `main`.
///
/// Returns the bare repository path and the seed working repository, which
/// tests can use to add branches.
pub fn bare_remote(root: &Path, files: &[(&str, &str)]) -> (PathBuf, Repository) {
  let bare = root.join("remote.git");
  let mut opts = RepositoryInitOptions::new();
  opts.bare(true).initial_head("main");
  Repository::init_opts(&bare, &opts).unwrap();

  let seed = init_repo(&root.join("seed"), files);
  push_branch(&seed, &bare, "main");
  (bare, seed)
}

/// Create `branch` in the seed repository from its current head, commit
/// `files` on it and push it to `remote`. The seed is left on `main`.
pub fn add_branch(seed: &Repository, remote: &Path, branch: &str, files: &[(&str, &str)]) {
  let head = seed.head().unwrap().peel_to_commit().unwrap();
  seed.branch(branch, &head, true).unwrap();
  seed.set_head(&format!("refs/heads/{branch}")).unwrap();
  seed.checkout_head(Some(git2::build::CheckoutBuilder::new().force())).unwrap();
  let workdir = seed.workdir().unwrap().to_path_buf();
  write_files(&workdir, files);
  commit_all(seed, &format!("seed {branch}"));
  push_branch(seed, remote, branch);

  seed.set_head("refs/heads/main").unwrap();
  seed.checkout_head(Some(git2::build::CheckoutBuilder::new().force())).unwrap();
}

/// Read a file from `reference` (branch or tag) in the bare repository.
pub fn read_blob(remote: &Path, reference: &str, path: &str) -> Option<String> {
  let repo = Repository::open_bare(remote).unwrap();
  let commit = repo.revparse_single(reference).ok()?.peel_to_commit().ok()?;
  let entry = commit.tree().unwrap().get_path(Path::new(path)).ok()?;
  let blob = repo.find_blob(entry.id()).ok()?;
  Some(String::from_utf8_lossy(blob.content()).to_string())
}

/// Number of commits reachable from `reference` in the bare repository.
pub fn commit_count(remote: &Path, reference: &str) -> usize {
  let repo = Repository::open_bare(remote).unwrap();
  let mut walk = repo.revwalk().unwrap();
  walk.push(repo.revparse_single(reference).unwrap().peel_to_commit().unwrap().id()).unwrap();
  walk.count()
}

/// Commit id a tag points at, if the tag exists.
pub fn tag_target(remote: &Path, tag: &str) -> Option<String> {
  let repo = Repository::open_bare(remote).unwrap();
  let reference = repo.find_reference(&format!("refs/tags/{tag}")).ok()?;
  Some(reference.peel_to_commit().ok()?.id().to_string())
}
