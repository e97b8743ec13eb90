use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::controlplane::ControlPlaneError;
use crate::deploy::TrackError;
use crate::manifest::ManifestError;
use crate::promotion::{DiscoverError, PromotionError, UpstreamError};
use crate::resource::{ObjectKey, StoreError};
use crate::secrets::SecretError;
use crate::source::FetchError;
use crate::sync::SyncError;

/// How a pass over one source ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PassOutcome {
  /// No source of that name is registered.
  NotFound,

  /// The head commit was already applied.
  Skipped { commit: String },

  /// A record was created; run the pass again right away.
  Requeue { commit: String, created: ObjectKey },

  /// A prerequisite is missing. The commit is not recorded so the next
  /// pass re-evaluates.
  Waiting(PassReport),

  /// Every phase ran and the commit was recorded.
  Completed(PassReport),
}

impl PassOutcome {
  pub fn requeue_after(&self, settings: &Settings) -> Duration {
    match self {
      PassOutcome::Requeue { .. } => Duration::ZERO,
      PassOutcome::Waiting(_) => settings.error_interval,
      PassOutcome::NotFound | PassOutcome::Skipped { .. } | PassOutcome::Completed(_) => settings.success_interval,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      PassOutcome::NotFound => "not found",
      PassOutcome::Skipped { .. } => "skipped",
      PassOutcome::Requeue { .. } => "requeue",
      PassOutcome::Waiting(_) => "waiting",
      PassOutcome::Completed(_) => "completed",
    }
  }

  pub fn report(&self) -> Option<&PassReport> {
    match self {
      PassOutcome::Waiting(report) | PassOutcome::Completed(report) => Some(report),
      _ => None,
    }
  }
}

/// Delay before the next pass, errors included.
pub fn requeue_after(result: &Result<PassOutcome, ReconcileError>, settings: &Settings) -> Duration {
  match result {
    Ok(outcome) => outcome.requeue_after(settings),
    Err(_) => settings.error_interval,
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredDeployment {
  pub deployment: String,
  pub stage: String,
  pub keptn_context: String,
}

/// What a pass that got past every creation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
  pub commit: String,
  /// Documents decoded from the manifest files.
  pub documents: usize,
  /// Documents skipped as unknown or malformed.
  pub skipped_documents: usize,
  pub updated: Vec<ObjectKey>,
  pub unchanged: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub promotion: Option<crate::promotion::PromotionReport>,
  pub triggered: Vec<TriggeredDeployment>,
  /// Missing prerequisites that kept the pass from completing.
  pub waiting: Vec<String>,
  #[serde(skip)]
  pub(crate) created: Option<ObjectKey>,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to resolve credentials: {0}")]
  Secret(#[from] SecretError),

  #[error("failed to create source working directory: {0}")]
  Workdir(#[source] io::Error),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error(transparent)]
  Discover(#[from] DiscoverError),

  #[error(transparent)]
  Promotion(#[from] PromotionError),

  #[error(transparent)]
  ControlPlane(#[from] ControlPlaneError),

  #[error(transparent)]
  Track(#[from] TrackError),
}

impl ReconcileError {
  /// Infrastructure failures that are expected to clear on retry, as
  /// opposed to configuration that needs fixing.
  pub fn is_transient(&self) -> bool {
    match self {
      ReconcileError::Store(e) | ReconcileError::Sync(SyncError::Store(e)) => store_transient(e),
      ReconcileError::Sync(SyncError::Serialize { .. }) => false,
      ReconcileError::Secret(_) => false,
      ReconcileError::Workdir(_) | ReconcileError::Fetch(_) | ReconcileError::Join(_) => true,
      ReconcileError::Manifest(_) | ReconcileError::Discover(_) => true,
      ReconcileError::Promotion(e) => match e {
        PromotionError::Upstream { source, .. } | PromotionError::Clone(source) => upstream_transient(source),
        PromotionError::Discover(_) | PromotionError::Workdir(_) | PromotionError::Assemble { .. } => true,
      },
      ReconcileError::ControlPlane(e) => control_plane_transient(e),
      ReconcileError::Track(e) => match e {
        TrackError::Store(e) => store_transient(e),
        TrackError::Hash { .. } => false,
        TrackError::Trigger { source, .. } => control_plane_transient(source),
      },
    }
  }
}

fn store_transient(e: &StoreError) -> bool {
  !matches!(e, StoreError::Decode { .. } | StoreError::Encode { .. } | StoreError::Parse { .. })
}

fn upstream_transient(e: &UpstreamError) -> bool {
  !matches!(e, UpstreamError::Bare)
}

fn control_plane_transient(e: &ControlPlaneError) -> bool {
  matches!(
    e,
    ControlPlaneError::Request { .. } | ControlPlaneError::Status { .. } | ControlPlaneError::Response { .. }
  )
}
