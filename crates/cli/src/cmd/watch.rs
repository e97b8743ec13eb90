//! Implementation of the `kgitops watch` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use kgitops_lib::config::Settings;
use kgitops_lib::driver::Scheduler;
use kgitops_lib::events::LogRecorder;

use super::reconciler;
use crate::output::print_info;

/// Reconcile all registered repositories until Ctrl-C. Events go to the log.
pub fn cmd_watch(settings: &Settings) -> Result<()> {
  let scheduler = Scheduler::new(reconciler(settings, Arc::new(LogRecorder))?);
  print_info(&format!("Watching repositories in {}", settings.store_dir.display()));
  info!(store = %settings.store_dir.display(), "starting scheduler");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(scheduler.run()).context("Scheduler stopped")?;
  Ok(())
}
