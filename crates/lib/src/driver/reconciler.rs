use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::types::{PassOutcome, PassReport, ReconcileError, TriggeredDeployment};
use super::{PHASE_ORDER, Phase};
use crate::config::Settings;
use crate::controlplane::{ControlPlane, Endpoint};
use crate::deploy::{DeploymentTracker, TrackOutcome, find_project};
use crate::events::EventRecorder;
use crate::manifest::{InstanceSpec, KindSpec, Manifest, ManifestSet, ProjectSpec, load_manifests};
use crate::promotion::{ArtifactLayout, UpstreamConfig, promote_artifacts, read_project_meta};
use crate::resource::{Kind, ObjectKey, Record, ResourceStore, modify};
use crate::secrets::SecretDecryptor;
use crate::source::{GitCredentials, GitRepositorySpec, GitRepositoryStatus, GixFetcher, SourceFetcher, SyncResult};
use crate::sync::apply_manifests;

/// Runs apply passes for registered source repositories.
pub struct Reconciler<C: ControlPlane> {
  store: Arc<dyn ResourceStore>,
  control_plane: C,
  recorder: Arc<dyn EventRecorder>,
  decryptor: Arc<dyn SecretDecryptor>,
  fetcher: Arc<dyn SourceFetcher>,
  settings: Settings,
}

impl<C: ControlPlane> Reconciler<C> {
  pub fn new(
    store: Arc<dyn ResourceStore>,
    control_plane: C,
    recorder: Arc<dyn EventRecorder>,
    decryptor: Arc<dyn SecretDecryptor>,
    settings: Settings,
  ) -> Self {
    Self {
      store,
      control_plane,
      recorder,
      decryptor,
      fetcher: Arc::new(GixFetcher),
      settings,
    }
  }

  /// Replace the git checkout, e.g. with a local fixture.
  pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn store(&self) -> &Arc<dyn ResourceStore> {
    &self.store
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// Run one pass for the source registered as `name`.
  ///
  /// A completed pass records the commit on the source; a failed pass marks
  /// the source `Failed` and leaves the last commit alone.
  pub async fn reconcile_source(&self, name: &str) -> Result<PassOutcome, ReconcileError> {
    let Some(record) = self.store.get(Kind::GitRepository, name)? else {
      debug!(source = name, "source not registered");
      return Ok(PassOutcome::NotFound);
    };
    let key = record.key();

    let result = self.run_pass(&record).await;
    match &result {
      Ok(PassOutcome::Completed(report)) => self.record_success(&key, &report.commit)?,
      Ok(outcome) => debug!(source = name, outcome = outcome.label(), "pass finished"),
      Err(e) => {
        warn!(source = name, error = %e, "pass failed");
        self.recorder.warning(&key, "SyncFailed", e.to_string());
        self.record_failure(&key, e);
      }
    }
    result
  }

  async fn run_pass(&self, record: &Record) -> Result<PassOutcome, ReconcileError> {
    let key = record.key();
    let spec: GitRepositorySpec = record.spec_as()?;
    let status: GitRepositoryStatus = record.status_as()?;
    let branch = spec.branch_or(&self.settings.default_branch).to_string();
    let base_dir = spec.base_dir_or(&self.settings.base_dir).to_string();
    let credentials = GitCredentials::from_spec(&spec, self.decryptor.as_ref())?;

    let workdir = tempfile::Builder::new()
      .prefix("kgitops-source-")
      .tempdir()
      .map_err(ReconcileError::Workdir)?;
    let commit = {
      let fetcher = Arc::clone(&self.fetcher);
      let dest = workdir.path().to_path_buf();
      tokio::task::spawn_blocking(move || fetcher.checkout(&credentials, &branch, &dest)).await??
    };

    if status.last_commit.as_deref() == Some(commit.as_str()) {
      info!(source = %key.name, commit = %commit, "commit already applied");
      return Ok(PassOutcome::Skipped { commit });
    }

    let loaded = load_manifests(workdir.path(), &base_dir)?;
    info!(
      source = %key.name,
      commit = %commit,
      documents = loaded.decoded,
      skipped = loaded.skipped,
      "loaded manifests"
    );
    let set = loaded.manifests;
    let mut report = PassReport {
      commit: commit.clone(),
      documents: loaded.decoded,
      skipped_documents: loaded.skipped,
      ..Default::default()
    };

    for phase in PHASE_ORDER {
      debug!(source = %key.name, phase = %phase, "running phase");
      match phase {
        Phase::Instance => self.apply_kind(&key, &set.instances, &mut report)?,
        Phase::Sequence => self.apply_kind(&key, &set.sequences, &mut report)?,
        Phase::Stage => self.apply_kind(&key, &set.stages, &mut report)?,
        Phase::Project => self.apply_kind(&key, &set.projects, &mut report)?,
        Phase::Promotion => self.promote(&key, workdir.path(), &base_dir, &mut report).await?,
        Phase::Service => self.apply_kind(&key, &set.services, &mut report)?,
        Phase::SequenceExecution => self.apply_kind(&key, &set.sequence_executions, &mut report)?,
        Phase::ScheduledExecution => self.apply_kind(&key, &set.scheduled_executions, &mut report)?,
        Phase::ServiceDeployment => self.apply_kind(&key, &set.service_deployments, &mut report)?,
        Phase::DeploymentTracking => self.track_deployments(&key, &set, &mut report).await?,
      }

      if let Some(created) = report.created.take() {
        info!(source = %key.name, created = %created, phase = %phase, "created record, requeueing");
        return Ok(PassOutcome::Requeue { commit, created });
      }
    }

    if report.waiting.is_empty() {
      Ok(PassOutcome::Completed(report))
    } else {
      info!(source = %key.name, waiting = report.waiting.len(), "pass waiting on prerequisites");
      Ok(PassOutcome::Waiting(report))
    }
  }

  fn apply_kind<T: KindSpec>(
    &self,
    owner: &ObjectKey,
    manifests: &[Manifest<T>],
    report: &mut PassReport,
  ) -> Result<(), ReconcileError> {
    let summary = apply_manifests(self.store.as_ref(), self.recorder.as_ref(), owner, manifests, |manifest, outcome| {
      debug!(kind = %T::KIND, name = %manifest.name, ?outcome, "applied");
    })?;
    report.created = summary.created;
    report.updated.extend(summary.updated);
    report.unchanged += summary.unchanged;
    Ok(())
  }

  async fn promote(
    &self,
    owner: &ObjectKey,
    worktree: &Path,
    base_dir: &str,
    report: &mut PassReport,
  ) -> Result<(), ReconcileError> {
    let layout = ArtifactLayout::new(worktree, base_dir);
    if !layout.base_root().is_dir() {
      debug!(source = %owner.name, "no artifact base directory");
      return Ok(());
    }
    let Some(project) = read_project_meta(&layout)? else {
      debug!(source = %owner.name, "no project metadata, skipping promotion");
      return Ok(());
    };

    let Some(record) = find_project(self.store.as_ref(), &project)? else {
      self.recorder.warning(
        owner,
        "KeptnProjectNotFound",
        format!("Keptn project {project} does not exist, not promoting artifacts"),
      );
      report.waiting.push(format!("project {project} not found"));
      return Ok(());
    };
    let spec: ProjectSpec = record.spec_as()?;
    let Some(upstream) = UpstreamConfig::from_project(&spec, self.decryptor.as_ref())? else {
      warn!(project = %project, "project has no upstream repository, skipping promotion");
      return Ok(());
    };

    let recorder = Arc::clone(&self.recorder);
    let target = owner.clone();
    let promoted = tokio::task::spawn_blocking(move || {
      promote_artifacts(&layout, &project, &upstream, recorder.as_ref(), &target)
    })
    .await??;
    info!(
      source = %owner.name,
      promoted = promoted.promoted.len(),
      skipped = promoted.skipped.len(),
      "artifact promotion finished"
    );
    report.promotion = Some(promoted);
    Ok(())
  }

  async fn track_deployments(
    &self,
    owner: &ObjectKey,
    set: &ManifestSet,
    report: &mut PassReport,
  ) -> Result<(), ReconcileError> {
    if set.service_deployments.is_empty() {
      return Ok(());
    }
    let endpoint = self.endpoint(set)?;
    let tracker = DeploymentTracker::new(
      self.store.as_ref(),
      &self.control_plane,
      self.recorder.as_ref(),
      &endpoint,
    );

    for deployment in &set.service_deployments {
      match tracker.track(deployment).await? {
        TrackOutcome::ContextCreated(created) => {
          report.created = Some(created);
          return Ok(());
        }
        TrackOutcome::Waiting { reason } => {
          self.recorder.warning(
            owner,
            "DeploymentWaiting",
            format!("Deployment {} is waiting: {reason}", deployment.name),
          );
          report.waiting.push(reason);
        }
        TrackOutcome::Triggered { stage, keptn_context } => report.triggered.push(TriggeredDeployment {
          deployment: deployment.name.clone(),
          stage,
          keptn_context,
        }),
        TrackOutcome::Unchanged => {}
      }
    }
    Ok(())
  }

  /// Control plane endpoint from the first Instance, in the checkout or the
  /// store, falling back to the configured API URL.
  fn endpoint(&self, set: &ManifestSet) -> Result<Endpoint, ReconcileError> {
    let stored;
    let instance = match set.instances.first() {
      Some(manifest) => Some(&manifest.spec),
      None => {
        stored = match self.store.list(Kind::Instance)?.first() {
          Some(record) => Some(record.spec_as::<InstanceSpec>()?),
          None => None,
        };
        stored.as_ref()
      }
    };
    Ok(Endpoint::from_instance(
      instance,
      self.settings.api_url.as_deref(),
      self.decryptor.as_ref(),
    )?)
  }

  fn record_success(&self, key: &ObjectKey, commit: &str) -> Result<(), ReconcileError> {
    let synced_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or_default();
    modify(self.store.as_ref(), key.kind, &key.name, |record| {
      let mut status: GitRepositoryStatus = record.status_as()?;
      status.last_commit = Some(commit.to_string());
      status.result = Some(SyncResult::Successful);
      status.last_synced_at = Some(synced_at);
      status.message = None;
      record.set_status(&status)
    })?;
    info!(source = %key.name, commit, "recorded applied commit");
    Ok(())
  }

  fn record_failure(&self, key: &ObjectKey, error: &ReconcileError) {
    let result = modify(self.store.as_ref(), key.kind, &key.name, |record| {
      let mut status: GitRepositoryStatus = record.status_as()?;
      status.result = Some(SyncResult::Failed);
      status.message = Some(error.to_string());
      record.set_status(&status)
    });
    if let Err(e) = result {
      warn!(source = %key.name, error = %e, "could not record failed pass");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::controlplane::{ControlPlaneError, TriggerEvent};
  use crate::events::MemoryRecorder;
  use crate::resource::MemoryStore;
  use crate::secrets::NoDecryptor;
  use crate::source::FetchError;
  use crate::util::fs::copy_dir;
  use crate::util::testutil::{bare_remote, commit_count, tag_target, write_files};
  use std::path::PathBuf;
  use std::sync::Mutex;
  use tempfile::TempDir;

  /// Serves a local directory as the checkout, at a settable commit.
  struct FixtureFetcher {
    tree: PathBuf,
    commit: Mutex<String>,
  }

  impl FixtureFetcher {
    fn new(tree: &Path, commit: &str) -> Self {
      Self {
        tree: tree.to_path_buf(),
        commit: Mutex::new(commit.to_string()),
      }
    }

    fn set_commit(&self, commit: &str) {
      *self.commit.lock().unwrap() = commit.to_string();
    }
  }

  impl SourceFetcher for FixtureFetcher {
    fn checkout(&self, _credentials: &GitCredentials, _branch: &str, dest: &Path) -> Result<String, FetchError> {
      copy_dir(&self.tree, dest).map_err(|e| FetchError::ResolveHead(e.to_string()))?;
      Ok(self.commit.lock().unwrap().clone())
    }
  }

  struct UnreachableFetcher;

  impl SourceFetcher for UnreachableFetcher {
    fn checkout(&self, _credentials: &GitCredentials, _branch: &str, _dest: &Path) -> Result<String, FetchError> {
      Err(FetchError::ResolveHead("remote unreachable".to_string()))
    }
  }

  #[derive(Default)]
  struct FakeControlPlane {
    sent: Mutex<Vec<TriggerEvent>>,
  }

  impl FakeControlPlane {
    fn sent(&self) -> Vec<TriggerEvent> {
      self.sent.lock().unwrap().clone()
    }
  }

  impl ControlPlane for FakeControlPlane {
    async fn send_event(&self, _endpoint: &Endpoint, event: &TriggerEvent) -> Result<String, ControlPlaneError> {
      let mut sent = self.sent.lock().unwrap();
      sent.push(event.clone());
      Ok(event.shkeptncontext.clone().unwrap_or_else(|| format!("ctx-{}", sent.len())))
    }
  }

  struct Harness {
    store: Arc<MemoryStore>,
    recorder: Arc<MemoryRecorder>,
    fetcher: Arc<FixtureFetcher>,
    reconciler: Reconciler<FakeControlPlane>,
  }

  fn harness(tree: &Path) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
      .create(Record::new(
        Kind::GitRepository,
        "source",
        serde_json::json!({ "repository": "https://git.example.com/shop.git" }),
      ))
      .unwrap();
    let recorder = Arc::new(MemoryRecorder::new());
    let fetcher = Arc::new(FixtureFetcher::new(tree, "c0ffee"));
    let settings = Settings {
      api_url: Some("http://keptn.local".to_string()),
      ..Default::default()
    };
    let reconciler = Reconciler::new(
      store.clone(),
      FakeControlPlane::default(),
      recorder.clone(),
      Arc::new(NoDecryptor),
      settings,
    )
    .with_fetcher(fetcher.clone());
    Harness {
      store,
      recorder,
      fetcher,
      reconciler,
    }
  }

  /// Reconcile until a pass stops requeueing.
  async fn settle(reconciler: &Reconciler<FakeControlPlane>) -> (usize, PassOutcome) {
    for pass in 1..=20 {
      match reconciler.reconcile_source("source").await.unwrap() {
        PassOutcome::Requeue { .. } => continue,
        outcome => return (pass, outcome),
      }
    }
    panic!("source never settled");
  }

  fn source_status(store: &MemoryStore) -> GitRepositoryStatus {
    store
      .get(Kind::GitRepository, "source")
      .unwrap()
      .unwrap()
      .status_as()
      .unwrap()
  }

  const STAGES: &str = "kind: KeptnStage\nmetadata:\n  name: dev\nspec:\n  project: shop\n---\nkind: KeptnStage\nmetadata:\n  name: prod\nspec:\n  project: shop\n";

  #[tokio::test]
  async fn unknown_source_is_not_found() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path());
    let outcome = h.reconciler.reconcile_source("missing").await.unwrap();
    assert_eq!(outcome, PassOutcome::NotFound);
  }

  #[tokio::test]
  async fn pass_stops_at_first_creation() {
    let temp = TempDir::new().unwrap();
    write_files(temp.path(), &[(".keptn/stages.yaml", STAGES)]);
    let h = harness(temp.path());

    let outcome = h.reconciler.reconcile_source("source").await.unwrap();

    assert_eq!(
      outcome,
      PassOutcome::Requeue {
        commit: "c0ffee".to_string(),
        created: ObjectKey::new(Kind::Stage, "dev"),
      }
    );
    assert_eq!(h.store.list(Kind::Stage).unwrap().len(), 1);
    assert!(source_status(&h.store).last_commit.is_none());
  }

  #[tokio::test]
  async fn applied_commit_is_skipped() {
    let temp = TempDir::new().unwrap();
    write_files(temp.path(), &[(".keptn/stages.yaml", STAGES)]);
    let h = harness(temp.path());

    let (passes, outcome) = settle(&h.reconciler).await;
    assert_eq!(passes, 3);
    assert!(matches!(outcome, PassOutcome::Completed(_)));

    let status = source_status(&h.store);
    assert_eq!(status.last_commit.as_deref(), Some("c0ffee"));
    assert_eq!(status.result, Some(SyncResult::Successful));
    assert!(status.last_synced_at.is_some());

    let outcome = h.reconciler.reconcile_source("source").await.unwrap();
    assert_eq!(
      outcome,
      PassOutcome::Skipped {
        commit: "c0ffee".to_string()
      }
    );
  }

  #[tokio::test]
  async fn missing_project_leaves_commit_unrecorded() {
    let temp = TempDir::new().unwrap();
    write_files(
      temp.path(),
      &[(
        ".keptn/deploy.yaml",
        "kind: KeptnServiceDeployment\nmetadata:\n  name: ghost-cart-dev\nspec:\n  project: ghost\n  service: cart\n  stage: dev\n  version: 1.0.0\n",
      )],
    );
    let h = harness(temp.path());

    let (_, outcome) = settle(&h.reconciler).await;

    let PassOutcome::Waiting(report) = outcome else {
      panic!("expected waiting, got {outcome:?}");
    };
    assert_eq!(report.waiting.len(), 1);
    assert!(source_status(&h.store).last_commit.is_none());
    assert!(h.recorder.reasons().contains(&"KeptnProjectNotFound".to_string()));
    assert!(h.recorder.reasons().contains(&"DeploymentWaiting".to_string()));
  }

  #[tokio::test]
  async fn failed_checkout_marks_source_failed() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path());
    let reconciler = h.reconciler.with_fetcher(Arc::new(UnreachableFetcher));

    let err = reconciler.reconcile_source("source").await.unwrap_err();
    assert!(matches!(err, ReconcileError::Fetch(_)));

    let status = source_status(&h.store);
    assert_eq!(status.result, Some(SyncResult::Failed));
    assert!(status.message.unwrap().contains("remote unreachable"));
    assert!(status.last_commit.is_none());
    assert_eq!(h.recorder.reasons(), vec!["SyncFailed"]);
  }

  #[tokio::test]
  async fn promotes_and_triggers_a_release() {
    let temp = TempDir::new().unwrap();
    let (remote, _seed) = bare_remote(temp.path(), &[("README.md", "upstream\n")]);
    let tree = temp.path().join("source");
    let project = format!(
      "kind: KeptnProject\nmetadata:\n  name: shop\nspec:\n  repository: {}\n",
      remote.display()
    );
    let deployments = "kind: KeptnService\nmetadata:\n  name: shop-cart\nspec:\n  project: shop\n  service: cart\n---\n\
kind: KeptnServiceDeployment\nmetadata:\n  name: shop-cart-dev\nspec:\n  project: shop\n  service: cart\n  stage: dev\n  version: 1.2.0\n---\n\
kind: KeptnServiceDeployment\nmetadata:\n  name: shop-cart-prod\nspec:\n  project: shop\n  service: cart\n  stage: prod\n  version: 1.2.0\n";
    write_files(
      &tree,
      &[
        (".keptn/stages.yaml", STAGES),
        (".keptn/project.yaml", &project),
        (".keptn/service.yaml", deployments),
        (".keptn/projectmeta.yaml", "spec:\n  project: shop\n"),
        (".keptn/base/cart/metadata.yaml", "spec:\n  version: 1.2.0\n"),
        (".keptn/base/cart/helm/cart/values.yaml", "replicas: 1\n"),
      ],
    );
    let h = harness(&tree);

    let (_, outcome) = settle(&h.reconciler).await;
    let PassOutcome::Completed(report) = outcome else {
      panic!("expected completed, got {outcome:?}");
    };

    assert!(tag_target(&remote, "cart-1.2.0-0").is_some());
    assert!(h.store.get(Kind::DeploymentContext, "shop-cart-1.2.0").unwrap().is_some());
    assert_eq!(report.triggered.len(), 2);
    assert!(report.triggered.iter().all(|t| t.keptn_context == "ctx-1"));
    assert_eq!(h.reconciler.control_plane.sent().len(), 2);

    let outcome = h.reconciler.reconcile_source("source").await.unwrap();
    assert!(matches!(outcome, PassOutcome::Skipped { .. }));

    let commits = commit_count(&remote, "main");
    h.fetcher.set_commit("beef");
    let (passes, outcome) = settle(&h.reconciler).await;
    assert_eq!(passes, 1);
    let PassOutcome::Completed(report) = outcome else {
      panic!("expected completed, got {outcome:?}");
    };
    assert!(report.triggered.is_empty());
    assert!(report.promotion.unwrap().promoted.is_empty());
    assert_eq!(h.reconciler.control_plane.sent().len(), 2);
    assert_eq!(commit_count(&remote, "main"), commits);
    assert_eq!(source_status(&h.store).last_commit.as_deref(), Some("beef"));
  }
}
