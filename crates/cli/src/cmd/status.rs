//! Status command implementation.
//!
//! Displays each registered repository's last sync and the number of records
//! of every kind in the store.

use anyhow::{Result, bail};
use serde_json::json;

use kgitops_lib::config::Settings;
use kgitops_lib::resource::{Kind, Record};
use kgitops_lib::source::{GitRepositorySpec, GitRepositoryStatus, SyncResult};

use super::open_store;
use crate::output::{
  OutputFormat, format_timestamp, print_error, print_info, print_json, print_stat, print_success, print_warning,
  truncate_hash,
};

pub fn cmd_status(settings: &Settings, name: Option<&str>, verbose: bool, format: OutputFormat) -> Result<()> {
  let store = open_store(settings);

  let sources: Vec<Record> = match name {
    Some(name) => match store.get(Kind::GitRepository, name)? {
      Some(record) => vec![record],
      None => bail!("No repository named {name} is registered"),
    },
    None => store.list(Kind::GitRepository)?,
  };

  let mut counts = Vec::new();
  for kind in Kind::ALL {
    counts.push((kind, store.list(kind)?.len()));
  }

  if format.is_json() {
    let mut items = Vec::new();
    for record in &sources {
      let spec: GitRepositorySpec = record.spec_as()?;
      let status: GitRepositoryStatus = record.status_as()?;
      items.push(json!({ "name": record.name, "repository": spec.repository, "branch": spec.branch_or(&settings.default_branch), "status": status }));
    }
    let count_map: serde_json::Map<String, serde_json::Value> = counts
      .iter()
      .map(|(kind, count)| (kind.as_str().to_string(), json!(count)))
      .collect();
    return print_json(&json!({ "repositories": items, "records": count_map }));
  }

  if sources.is_empty() {
    print_info("No repositories registered. Run 'kgitops register <file>' to add one.");
  }

  for record in &sources {
    let spec: GitRepositorySpec = record.spec_as()?;
    let status: GitRepositoryStatus = record.status_as()?;

    let headline = format!("{} ({} @ {})", record.name, spec.repository, spec.branch_or(&settings.default_branch));
    match status.result {
      Some(SyncResult::Successful) => print_success(&headline),
      Some(SyncResult::Failed) => print_error(&headline),
      None => print_warning(&format!("{headline}: never synced")),
    }
    if let Some(commit) = &status.last_commit {
      print_stat("Last commit", truncate_hash(commit));
    }
    if let Some(synced_at) = status.last_synced_at {
      print_stat("Last synced", &format_timestamp(synced_at));
    }
    if let Some(message) = &status.message {
      print_stat("Message", message);
    }
    if verbose {
      print_stat("Base dir", spec.base_dir_or(&settings.base_dir));
    }
  }

  println!();
  println!("Records:");
  for (kind, count) in counts {
    if count > 0 || verbose {
      print_stat(kind.as_str(), &count.to_string());
    }
  }
  Ok(())
}
