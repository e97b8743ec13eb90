//! Triggers stage deployments when their effective spec changes.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{DeploymentContextSpec, DeploymentContextStatus, ServiceDeploymentStatus, context_name};
use crate::consts::DEFAULT_DEPLOYMENT_EVENT;
use crate::controlplane::{ControlPlane, ControlPlaneError, Endpoint, TriggerEvent};
use crate::events::EventRecorder;
use crate::manifest::{Manifest, ProjectSpec, ServiceDeploymentSpec, ServiceSpec, StageSpec};
use crate::resource::{Kind, ObjectKey, Record, ResourceStore, StoreError, modify};
use crate::util::hash::{HashError, Hashable};

#[derive(Debug, Error)]
pub enum TrackError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to hash {key}: {source}")]
  Hash {
    key: ObjectKey,
    #[source]
    source: HashError,
  },

  #[error("failed to trigger deployment of {key}: {source}")]
  Trigger {
    key: ObjectKey,
    #[source]
    source: ControlPlaneError,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
  /// A prerequisite record is missing; nothing was triggered.
  Waiting { reason: String },
  /// The deployment context was created. The pass must stop here.
  ContextCreated(ObjectKey),
  /// A trigger was sent for the stage.
  Triggered { stage: String, keptn_context: String },
  /// The stage already runs this spec.
  Unchanged,
}

pub struct DeploymentTracker<'a, C: ControlPlane> {
  store: &'a dyn ResourceStore,
  control_plane: &'a C,
  recorder: &'a dyn EventRecorder,
  endpoint: &'a Endpoint,
}

impl<'a, C: ControlPlane> DeploymentTracker<'a, C> {
  pub fn new(
    store: &'a dyn ResourceStore,
    control_plane: &'a C,
    recorder: &'a dyn EventRecorder,
    endpoint: &'a Endpoint,
  ) -> Self {
    Self {
      store,
      control_plane,
      recorder,
      endpoint,
    }
  }

  /// Reconcile one service deployment against its deployment context.
  ///
  /// The stage's hash and the correlation id are recorded only after the
  /// trigger succeeds, so a failed status write leads to a retrigger.
  pub async fn track(&self, deployment: &Manifest<ServiceDeploymentSpec>) -> Result<TrackOutcome, TrackError> {
    let spec = &deployment.spec;
    let key = ObjectKey::new(Kind::ServiceDeployment, &deployment.name);

    if !self.project_exists(&spec.project)? {
      self.recorder.warning(
        &key,
        "KeptnProjectNotFound",
        format!("Keptn project {} does not exist", spec.project),
      );
      self.mark_pending(&deployment.name)?;
      return Ok(TrackOutcome::Waiting {
        reason: format!("project {} not found", spec.project),
      });
    }

    let Some((service_key, service)) = self.find_service(&spec.project, &spec.service)? else {
      self.recorder.warning(
        &key,
        "KeptnServiceNotFound",
        format!("Keptn service {} in project {} does not exist", spec.service, spec.project),
      );
      self.mark_pending(&deployment.name)?;
      return Ok(TrackOutcome::Waiting {
        reason: format!("service {} in project {} not found", spec.service, spec.project),
      });
    };

    let name = context_name(&spec.project, &spec.service, &spec.version);
    let Some(context) = self.store.get(Kind::DeploymentContext, &name)? else {
      let created = self.create_context(&name, spec, service_key)?;
      return Ok(TrackOutcome::ContextCreated(created));
    };
    let mut status: DeploymentContextStatus = context.status_as()?;
    self.prune_stages(&name, &spec.project, &spec.stage, &mut status)?;

    let hash = spec
      .spec_hash()
      .map_err(|source| TrackError::Hash { key: key.clone(), source })?;
    let record = self
      .store
      .get(Kind::ServiceDeployment, &deployment.name)?
      .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
    let deployment_status: ServiceDeploymentStatus = record.status_as()?;

    let applied = status.last_applied_hash.get(&spec.stage).map(String::as_str);
    if applied == Some(hash.as_str()) && !deployment_status.update_pending {
      debug!(deployment = %deployment.name, stage = %spec.stage, "stage up to date");
      return Ok(TrackOutcome::Unchanged);
    }

    let sequence = service
      .trigger
      .as_deref()
      .filter(|t| !t.is_empty())
      .unwrap_or(DEFAULT_DEPLOYMENT_EVENT);
    let event = TriggerEvent::deployment(spec, sequence, status.chained_context());
    let minted = self
      .control_plane
      .send_event(self.endpoint, &event)
      .await
      .map_err(|source| TrackError::Trigger { key: key.clone(), source })?;
    let keptn_context = if minted.is_empty() {
      status.keptn_context.clone()
    } else {
      minted
    };

    modify(self.store, Kind::DeploymentContext, &name, |record| {
      let mut current: DeploymentContextStatus = record.status_as()?;
      current.keptn_context = keptn_context.clone();
      current.last_applied_hash.insert(spec.stage.clone(), hash.0.clone());
      record.set_status(&current)
    })?;
    modify(self.store, Kind::ServiceDeployment, &deployment.name, |record| {
      record.set_status(&ServiceDeploymentStatus {
        keptn_context: keptn_context.clone(),
        last_applied_hash: hash.0.clone(),
        update_pending: false,
      })
    })?;

    info!(
      deployment = %deployment.name,
      stage = %spec.stage,
      version = %spec.version,
      keptn_context = %keptn_context,
      "triggered deployment"
    );
    self.recorder.normal(
      &key,
      "DeploymentTriggered",
      format!("Triggered {} {} in stage {}", spec.service, spec.version, spec.stage),
    );
    Ok(TrackOutcome::Triggered {
      stage: spec.stage.clone(),
      keptn_context,
    })
  }

  fn project_exists(&self, project: &str) -> Result<bool, TrackError> {
    Ok(find_project(self.store, project)?.is_some())
  }

  fn find_service(&self, project: &str, service: &str) -> Result<Option<(ObjectKey, ServiceSpec)>, TrackError> {
    for record in self.store.list(Kind::Service)? {
      let spec: ServiceSpec = record.spec_as()?;
      if spec.project == project && spec.service == service {
        return Ok(Some((record.key(), spec)));
      }
    }
    Ok(None)
  }

  fn mark_pending(&self, name: &str) -> Result<(), TrackError> {
    modify(self.store, Kind::ServiceDeployment, name, |record| {
      let mut status: ServiceDeploymentStatus = record.status_as()?;
      status.update_pending = true;
      record.set_status(&status)
    })?;
    Ok(())
  }

  fn create_context(&self, name: &str, spec: &ServiceDeploymentSpec, owner: ObjectKey) -> Result<ObjectKey, TrackError> {
    let context = DeploymentContextSpec {
      project: spec.project.clone(),
      service: spec.service.clone(),
      version: spec.version.clone(),
    };
    let key = ObjectKey::new(Kind::DeploymentContext, name);
    let value = serde_json::to_value(&context).map_err(|source| StoreError::Encode { key: key.clone(), source })?;
    match self.store.create(Record::new(Kind::DeploymentContext, name, value).with_owner(owner)) {
      Ok(_) => {}
      Err(StoreError::AlreadyExists { .. }) => debug!(context = name, "deployment context created concurrently"),
      Err(e) => return Err(e.into()),
    }
    info!(context = name, "created deployment context");
    self.recorder.normal(&key, "Created", format!("Created deployment context {name}"));
    Ok(key)
  }

  /// Drop stage hashes for stages the project no longer defines.
  fn prune_stages(
    &self,
    name: &str,
    project: &str,
    current: &str,
    status: &mut DeploymentContextStatus,
  ) -> Result<(), TrackError> {
    let mut known = Vec::new();
    for record in self.store.list(Kind::Stage)? {
      let stage: StageSpec = record.spec_as()?;
      if stage.project == project {
        known.push(record.name);
      }
    }
    if known.is_empty() {
      return Ok(());
    }

    let pruned = status.prune_stages(&known, current);
    if pruned.is_empty() {
      return Ok(());
    }
    warn!(context = name, stages = ?pruned, "pruning stage hashes for removed stages");
    modify(self.store, Kind::DeploymentContext, name, |record| {
      let mut current_status: DeploymentContextStatus = record.status_as()?;
      current_status.prune_stages(&known, current);
      record.set_status(&current_status)
    })?;
    Ok(())
  }
}

/// The Project record for `project`, matched by record name or by the
/// `project` field of its spec.
pub fn find_project(store: &dyn ResourceStore, project: &str) -> Result<Option<Record>, StoreError> {
  if let Some(record) = store.get(Kind::Project, project)? {
    return Ok(Some(record));
  }
  for record in store.list(Kind::Project)? {
    let spec: ProjectSpec = record.spec_as()?;
    if spec.project.as_deref() == Some(project) {
      return Ok(Some(record));
    }
  }
  Ok(None)
}
