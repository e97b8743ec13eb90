//! Implementation of the `kgitops register` command.
//!
//! Reads `KeptnGitRepository` documents from a file and upserts them into the
//! resource store. Unchanged documents are left alone.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use kgitops_lib::config::Settings;
use kgitops_lib::manifest::decode_kind;
use kgitops_lib::resource::Kind;
use kgitops_lib::source::GitRepositorySpec;
use kgitops_lib::sync::{SyncOutcome, sync_root};

use super::open_store;
use crate::output::{OutputFormat, print_info, print_json, print_success};

#[derive(Serialize)]
struct Registered {
  name: String,
  repository: String,
  outcome: SyncOutcome,
}

pub fn cmd_register(settings: &Settings, file: &Path, format: OutputFormat) -> Result<()> {
  let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
  let origin = dunce::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
  let manifests = decode_kind::<GitRepositorySpec>(&content, &origin.display().to_string())?;
  if manifests.is_empty() {
    bail!("{} contains no KeptnGitRepository documents", file.display());
  }

  let store = open_store(settings);
  let mut registered = Vec::new();
  for manifest in manifests {
    let outcome = sync_root(store.as_ref(), Kind::GitRepository, &manifest.name, &manifest.spec)
      .with_context(|| format!("Failed to register {}", manifest.name))?;
    info!(name = %manifest.name, ?outcome, "registered repository");
    registered.push(Registered {
      name: manifest.name,
      repository: manifest.spec.repository,
      outcome,
    });
  }

  if format.is_json() {
    return print_json(&registered);
  }
  for entry in &registered {
    match entry.outcome {
      SyncOutcome::Created => print_success(&format!("Registered {} ({})", entry.name, entry.repository)),
      SyncOutcome::Updated => print_success(&format!("Updated {} ({})", entry.name, entry.repository)),
      SyncOutcome::Unchanged => print_info(&format!("{} is unchanged", entry.name)),
    }
  }
  Ok(())
}
