//! The apply driver.
//!
//! One pass over a source repository:
//!
//! 1. Check out the configured branch into a fresh temporary directory
//! 2. Skip the pass if the head commit was already applied
//! 3. Load manifests from the base directory
//! 4. Upsert each kind in [`PHASE_ORDER`], stopping the pass at the first
//!    creation so dependents are only created once their dependency exists
//! 5. Promote artifacts after projects exist, then trigger deployments
//! 6. Record the commit on the source once the whole pass succeeded

mod reconciler;
mod scheduler;
mod types;

pub use reconciler::Reconciler;
pub use scheduler::Scheduler;
pub use types::{PassOutcome, PassReport, ReconcileError, TriggeredDeployment, requeue_after};

use std::fmt;

/// A step of the apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Instance,
  Sequence,
  Stage,
  Project,
  Promotion,
  Service,
  SequenceExecution,
  ScheduledExecution,
  ServiceDeployment,
  DeploymentTracking,
}

/// Dependencies first: nothing is created before what it references.
pub const PHASE_ORDER: [Phase; 10] = [
  Phase::Instance,
  Phase::Sequence,
  Phase::Stage,
  Phase::Project,
  Phase::Promotion,
  Phase::Service,
  Phase::SequenceExecution,
  Phase::ScheduledExecution,
  Phase::ServiceDeployment,
  Phase::DeploymentTracking,
];

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Instance => "instance",
      Phase::Sequence => "sequence",
      Phase::Stage => "stage",
      Phase::Project => "project",
      Phase::Promotion => "promotion",
      Phase::Service => "service",
      Phase::SequenceExecution => "sequence-execution",
      Phase::ScheduledExecution => "scheduled-execution",
      Phase::ServiceDeployment => "service-deployment",
      Phase::DeploymentTracking => "deployment-tracking",
    };
    f.write_str(name)
  }
}
