//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use kgitops_lib::config::Settings;
use kgitops_lib::controlplane::HttpControlPlane;
use kgitops_lib::driver::{PassOutcome, Reconciler};
use kgitops_lib::events::MemoryRecorder;
use kgitops_lib::resource::{FileStore, Kind, Record, ResourceStore};
use kgitops_lib::secrets::NoDecryptor;

/// A source repository on `main` that tests commit manifests into.
pub struct SourceRepo {
  pub path: PathBuf,
  repo: Repository,
}

impl SourceRepo {
  pub fn init(path: &Path) -> Self {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(path, &opts).unwrap();
    Self {
      path: path.to_path_buf(),
      repo,
    }
  }

  /// Write `files` and commit everything. Returns the new commit id.
  pub fn commit(&self, files: &[(&str, &str)]) -> String {
    for (rel, content) in files {
      let path = self.path.join(rel);
      std::fs::create_dir_all(path.parent().unwrap()).unwrap();
      std::fs::write(path, content).unwrap();
    }
    let mut index = self.repo.index().unwrap();
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
    index.write().unwrap();
    let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    self
      .repo
      .commit(Some("HEAD"), &sig, &sig, "update manifests", &tree, &parents)
      .unwrap()
      .to_string()
  }
}

/// File store, recorder and reconciler rooted in one temp directory.
pub struct Controller {
  pub temp: TempDir,
  pub store: Arc<FileStore>,
  pub recorder: Arc<MemoryRecorder>,
  pub reconciler: Reconciler<HttpControlPlane>,
}

impl Controller {
  pub fn new(temp: TempDir) -> Self {
    let store = Arc::new(FileStore::new(temp.path().join("store")));
    let recorder = Arc::new(MemoryRecorder::new());
    let settings = Settings {
      store_dir: temp.path().join("store"),
      ..Default::default()
    };
    let control_plane = HttpControlPlane::new(settings.http_timeout).unwrap();
    let reconciler = Reconciler::new(
      store.clone(),
      control_plane,
      recorder.clone(),
      Arc::new(NoDecryptor),
      settings,
    );
    Self {
      temp,
      store,
      recorder,
      reconciler,
    }
  }

  pub fn register(&self, name: &str, repository: &Path) {
    let spec = serde_json::json!({ "repository": repository.to_str().unwrap() });
    self
      .store
      .create(Record::new(Kind::GitRepository, name, spec))
      .unwrap();
  }

  /// Reconcile `name` until a pass stops requeueing.
  pub async fn settle(&self, name: &str) -> PassOutcome {
    for _ in 0..20 {
      match self.reconciler.reconcile_source(name).await.unwrap() {
        PassOutcome::Requeue { .. } => continue,
        outcome => return outcome,
      }
    }
    panic!("{name} never settled");
  }
}

pub fn instance(api_url: &str) -> String {
  format!("kind: KeptnInstance\nmetadata:\n  name: keptn\nspec:\n  apiUrl: {api_url}\n  apiToken: secret\n")
}

pub const PROJECT: &str = "\
kind: KeptnProject
metadata:
  name: shop
spec:
  project: shop
---
kind: KeptnStage
metadata:
  name: dev
spec:
  project: shop
---
kind: KeptnStage
metadata:
  name: prod
spec:
  project: shop
---
kind: KeptnService
metadata:
  name: shop-cart
spec:
  project: shop
  service: cart
";

pub fn deployments(version: &str) -> String {
  ["dev", "prod"]
    .iter()
    .map(|stage| {
      format!(
        "kind: KeptnServiceDeployment\nmetadata:\n  name: shop-cart-{stage}\nspec:\n  project: shop\n  service: cart\n  stage: {stage}\n  version: {version}\n"
      )
    })
    .collect::<Vec<_>>()
    .join("---\n")
}
