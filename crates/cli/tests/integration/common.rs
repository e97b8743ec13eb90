//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use git2::{IndexAddOption, Oid, PushOptions, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the resource store and
/// any git repositories it creates.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory and return its path.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    write(&path, content);
    path
  }

  /// Resource store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Working repository at `name` on `main` with one commit of `files`.
  pub fn source_repo(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = self.temp.path().join(name);
    init_repo(&dir, files);
    dunce::canonicalize(&dir).unwrap_or(dir)
  }

  /// Bare repository whose `main` holds `files`, plus a `branches` copy of it.
  pub fn upstream_repo(&self, files: &[(&str, &str)], branches: &[&str]) -> PathBuf {
    let bare = self.temp.path().join("upstream.git");
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    Repository::init_opts(&bare, &opts).unwrap();

    let seed = init_repo(&self.temp.path().join("upstream-seed"), files);
    let mut origin = seed.remote("origin", bare.to_str().unwrap()).unwrap();
    let mut refspecs = vec!["refs/heads/main:refs/heads/main".to_string()];
    for branch in branches {
      refspecs.push(format!("refs/heads/main:refs/heads/{branch}"));
    }
    let refspecs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    origin.push(&refspecs, Some(&mut PushOptions::new())).unwrap();
    dunce::canonicalize(&bare).unwrap_or(bare)
  }

  /// Register a `KeptnGitRepository` named `name` pointing at `repository`.
  pub fn register(&self, name: &str, repository: &Path) {
    let manifest = format!(
      "kind: KeptnGitRepository\nmetadata:\n  name: {name}\nspec:\n  repository: {}\n",
      repository.display()
    );
    let file = self.write_file(&format!("{name}-source.yaml"), &manifest);
    self.kgitops_cmd().arg("register").arg(file).assert().success();
  }

  /// Get a pre-configured Command for the kgitops binary.
  ///
  /// Points the resource store into the temp directory and clears the
  /// control-plane and key variables so the host environment cannot leak in.
  pub fn kgitops_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("kgitops");
    cmd.env("KGITOPS_STORE_DIR", self.store_path());
    cmd.env_remove("KEPTN_API_URL");
    cmd.env_remove("RSA_PRIVATE_KEY");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

fn write(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

fn init_repo(dir: &Path, files: &[(&str, &str)]) -> Repository {
  let mut opts = RepositoryInitOptions::new();
  opts.initial_head("main");
  let repo = Repository::init_opts(dir, &opts).unwrap();
  for (rel, content) in files {
    write(&dir.join(rel), content);
  }
  commit_all(&repo);
  repo
}

fn commit_all(repo: &Repository) -> Oid {
  let mut index = repo.index().unwrap();
  index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
  index.write().unwrap();
  let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
  let sig = Signature::now("Test", "test@example.com").unwrap();
  repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap()
}

/// Read a file from `reference` in the bare repository.
pub fn read_blob(remote: &Path, reference: &str, path: &str) -> Option<String> {
  let repo = Repository::open_bare(remote).unwrap();
  let commit = repo.revparse_single(reference).ok()?.peel_to_commit().ok()?;
  let entry = commit.tree().unwrap().get_path(Path::new(path)).ok()?;
  let blob = repo.find_blob(entry.id()).ok()?;
  Some(String::from_utf8_lossy(blob.content()).to_string())
}

pub const STAGE_DEV: &str = "kind: KeptnStage\nmetadata:\n  name: dev\nspec:\n  project: shop\n";
