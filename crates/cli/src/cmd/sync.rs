//! Implementation of the `kgitops sync` command.
//!
//! Runs a single apply pass for one repository and prints what happened,
//! including the events recorded along the way.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use kgitops_lib::config::Settings;
use kgitops_lib::driver::{PassOutcome, PassReport};
use kgitops_lib::events::MemoryRecorder;

use super::reconciler;
use crate::output::{
  OutputFormat, format_duration, print_event, print_info, print_json, print_stat, print_success, print_warning,
  truncate_hash,
};

pub fn cmd_sync(settings: &Settings, name: &str, format: OutputFormat) -> Result<()> {
  let recorder = Arc::new(MemoryRecorder::new());
  let reconciler = reconciler(settings, recorder.clone())?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(reconciler.reconcile_source(name));
  let events = recorder.drain();

  let outcome = match result {
    Ok(outcome) => outcome,
    Err(e) => {
      if !format.is_json() {
        events.iter().for_each(print_event);
      }
      return Err(e).with_context(|| format!("Sync of {name} failed"));
    }
  };

  if format.is_json() {
    return print_json(&json!({
      "source": name,
      "result": outcome,
      "requeueAfterSecs": outcome.requeue_after(settings).as_secs(),
      "events": events,
    }));
  }

  match &outcome {
    PassOutcome::NotFound => print_warning(&format!("No repository named {name} is registered")),
    PassOutcome::Skipped { commit } => print_info(&format!("{name} is up to date at {}", truncate_hash(commit))),
    PassOutcome::Requeue { commit, created } => {
      print_success(&format!("Created {created} from {}", truncate_hash(commit)));
      print_info("Run sync again to continue the pass");
    }
    PassOutcome::Waiting(report) => {
      print_warning(&format!("{name} is waiting on prerequisites"));
      print_report(report);
      for reason in &report.waiting {
        print_stat("Waiting", reason);
      }
    }
    PassOutcome::Completed(report) => {
      print_success(&format!("Synced {name} at {}", truncate_hash(&report.commit)));
      print_report(report);
    }
  }

  if !events.is_empty() {
    println!();
    println!("Events:");
    events.iter().for_each(print_event);
  }
  print_stat("Next pass in", &format_duration(outcome.requeue_after(settings)));
  Ok(())
}

fn print_report(report: &PassReport) {
  print_stat("Documents", &report.documents.to_string());
  if report.skipped_documents > 0 {
    print_stat("Skipped documents", &report.skipped_documents.to_string());
  }
  print_stat("Updated", &report.updated.len().to_string());
  print_stat("Unchanged", &report.unchanged.to_string());
  if let Some(promotion) = &report.promotion {
    for promoted in &promotion.promoted {
      print_stat("Promoted", &format!("{} at {}", promoted.tag, truncate_hash(&promoted.commit)));
    }
  }
  for triggered in &report.triggered {
    print_stat(
      "Triggered",
      &format!("{} in {} ({})", triggered.deployment, triggered.stage, triggered.keptn_context),
    );
  }
}
