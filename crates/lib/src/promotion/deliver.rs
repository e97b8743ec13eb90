//! Publishes service artifacts to the upstream repository as tagged commits.

use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::discover::{DiscoverError, Discovery, discover_services, discover_stages};
use super::types::{ArtifactLayout, ArtifactService, PromotedTag, PromotionReport, StageOverlay};
use super::upstream::{Upstream, UpstreamConfig, UpstreamError};
use crate::consts::{
  ARTIFACT_BASE_DIR, ARTIFACT_STAGES_DIR, PROMOTION_AUTHOR_EMAIL, PROMOTION_AUTHOR_NAME, PROMOTION_COMMIT_MESSAGE,
  PROMOTION_TAG_MESSAGE,
};
use crate::events::EventRecorder;
use crate::resource::ObjectKey;
use crate::util::fs::{FsError, copy_dir, remove_dir_if_exists};

#[derive(Debug, Error)]
pub enum PromotionError {
  #[error(transparent)]
  Discover(#[from] DiscoverError),

  #[error("failed to create upstream working directory: {0}")]
  Workdir(#[source] io::Error),

  #[error("failed to assemble artifacts for '{service}': {source}")]
  Assemble {
    service: String,
    #[source]
    source: FsError,
  },

  #[error("failed to promote '{service}': {source}")]
  Upstream {
    service: String,
    #[source]
    source: UpstreamError,
  },

  #[error(transparent)]
  Clone(UpstreamError),
}

/// Promote every artifact service in `layout` to the upstream repository.
///
/// Each service is copied into `base/<service>` with its stage overlays under
/// `stages/<stage>/<service>`, committed and tagged `<service>-<version>-<configVersion>`.
/// An existing tag is only replaced when the service allows it; otherwise
/// the service is skipped and a warning event is recorded on `target`.
pub fn promote_artifacts(
  layout: &ArtifactLayout,
  project: &str,
  upstream: &UpstreamConfig,
  recorder: &dyn EventRecorder,
  target: &ObjectKey,
) -> Result<PromotionReport, PromotionError> {
  let mut report = PromotionReport {
    project: project.to_string(),
    ..Default::default()
  };

  let Discovery { services, rejected } = discover_services(layout)?;
  for rejected in rejected {
    recorder.warning(
      target,
      "InvalidArtifact",
      format!("Skipping artifact {}: {}", rejected.name, rejected.reason),
    );
    report.rejected.push(rejected.name);
  }
  if services.is_empty() {
    debug!(project, "no artifacts to promote");
    return Ok(report);
  }

  let stages = discover_stages(layout)?;
  let workdir = tempfile::Builder::new()
    .prefix("kgitops-upstream-")
    .tempdir()
    .map_err(PromotionError::Workdir)?;
  let repo = Upstream::clone_into(upstream, workdir.path()).map_err(PromotionError::Clone)?;

  for service in &services {
    let tag = service.tag();
    let exists = repo.tag_exists(&tag).map_err(upstream_err(service))?;
    if exists && !service.metadata.overwrite_tag {
      info!(service = %service.name, tag = %tag, "tag exists, not overwriting");
      recorder.warning(target, "TagExists", format!("Would not overwrite tag {tag}"));
      report.skipped.push(tag);
      continue;
    }

    assemble(&repo, layout, service, &stages)?;
    let promoted = publish(&repo, service, &tag, exists, recorder, target)?;
    recorder.normal(
      target,
      "ArtifactPromoted",
      format!("Promoted {} as {}", service.name, promoted.tag),
    );
    report.promoted.push(promoted);
  }

  Ok(report)
}

fn upstream_err(service: &ArtifactService) -> impl Fn(UpstreamError) -> PromotionError + '_ {
  move |source| PromotionError::Upstream {
    service: service.name.clone(),
    source,
  }
}

/// Replace the service's directories in the upstream working tree.
fn assemble(
  repo: &Upstream,
  layout: &ArtifactLayout,
  service: &ArtifactService,
  stages: &[StageOverlay],
) -> Result<(), PromotionError> {
  let fs_err = |source| PromotionError::Assemble {
    service: service.name.clone(),
    source,
  };
  let name = &service.name;
  let dest_base = repo.workdir().join(ARTIFACT_BASE_DIR).join(name);
  let dest_stages = repo.workdir().join(ARTIFACT_STAGES_DIR);

  remove_dir_if_exists(&dest_base).map_err(fs_err)?;
  for stage in stages {
    remove_dir_if_exists(&dest_stages.join(&stage.name).join(name)).map_err(fs_err)?;
  }

  copy_dir(&service.path, &dest_base).map_err(fs_err)?;

  if let Some(chart_dir) = service.metadata.chart_dir.as_deref().filter(|d| !d.is_empty()) {
    let chart_src = layout.worktree().join(chart_dir);
    copy_dir(&chart_src, &dest_base.join("helm").join(name)).map_err(fs_err)?;
  }

  for stage in stages {
    let overlay = stage.service_dir(name);
    if overlay.is_dir() {
      copy_dir(&overlay, &dest_stages.join(&stage.name).join(name)).map_err(fs_err)?;
      debug!(service = %name, stage = %stage.name, "copied stage overlay");
    } else {
      debug!(service = %name, stage = %stage.name, "no stage overlay");
    }
  }
  Ok(())
}

/// Commit, tag and push the assembled tree.
fn publish(
  repo: &Upstream,
  service: &ArtifactService,
  tag: &str,
  replace: bool,
  recorder: &dyn EventRecorder,
  target: &ObjectKey,
) -> Result<PromotedTag, PromotionError> {
  let err = upstream_err(service);

  let tree = repo.stage_all().map_err(&err)?;
  let commit = match repo
    .commit_if_changed(tree, PROMOTION_COMMIT_MESSAGE, PROMOTION_AUTHOR_NAME, PROMOTION_AUTHOR_EMAIL)
    .map_err(&err)?
  {
    Some(commit) => commit,
    None => repo.head_commit().map_err(&err)?,
  };

  repo
    .create_tag(tag, commit, PROMOTION_TAG_MESSAGE, PROMOTION_AUTHOR_NAME, PROMOTION_AUTHOR_EMAIL)
    .map_err(&err)?;

  repo.push_branch().map_err(&err)?;
  // The old remote tag stays until the branch has landed.
  if replace {
    repo.delete_remote_tag(tag).map_err(&err)?;
  }
  if let Err(e) = repo.push_tag(tag) {
    warn!(tag, error = %e, "tag push failed");
    recorder.warning(target, "TagPushFailed", format!("Could not push tag {tag}: {e}"));
  }

  info!(service = %service.name, tag, commit = %commit, replaced = replace, "promoted artifact");
  Ok(PromotedTag {
    service: service.name.clone(),
    tag: tag.to_string(),
    commit: commit.to_string(),
    replaced: replace,
  })
}
