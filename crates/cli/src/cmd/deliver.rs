//! Implementation of the `kgitops deliver` command.
//!
//! Copies a promoted artifact tag onto its stage branch in the project's
//! upstream repository, using the credentials of the stored Project record.

use anyhow::{Context, Result, anyhow};
use serde_json::json;

use kgitops_lib::config::Settings;
use kgitops_lib::deploy::find_project;
use kgitops_lib::manifest::ProjectSpec;
use kgitops_lib::promotion::{StageDelivery, UpstreamConfig, deliver_to_stage};

use super::{decryptor, open_store};
use crate::output::{OutputFormat, print_info, print_json, print_success, truncate_hash};

pub struct DeliverArgs {
  pub stage: String,
  pub service: String,
  pub version: String,
  pub config_version: Option<String>,
}

pub fn cmd_deliver(settings: &Settings, project: &str, args: DeliverArgs, format: OutputFormat) -> Result<()> {
  let store = open_store(settings);
  let record = find_project(store.as_ref(), project)?
    .ok_or_else(|| anyhow!("Project {project} is not in the store; sync its repository first"))?;
  let spec: ProjectSpec = record.spec_as()?;
  let upstream = UpstreamConfig::from_project(&spec, decryptor(settings)?.as_ref())
    .context("Failed to resolve upstream credentials")?
    .ok_or_else(|| anyhow!("Project {project} has no upstream repository"))?;

  let delivery = StageDelivery {
    stage: args.stage,
    service: args.service,
    version: args.version,
    config_version: args.config_version,
  };
  let tag = delivery.tag();
  let commit = deliver_to_stage(&upstream, &delivery)
    .with_context(|| format!("Failed to deliver {tag} to stage {}", delivery.stage))?;

  if format.is_json() {
    return print_json(&json!({ "project": project, "stage": delivery.stage, "tag": tag, "commit": commit }));
  }
  match commit {
    Some(commit) => print_success(&format!(
      "Delivered {tag} to {} at {}",
      delivery.stage,
      truncate_hash(&commit)
    )),
    None => print_info(&format!("Stage {} already has {tag}", delivery.stage)),
  }
  Ok(())
}
