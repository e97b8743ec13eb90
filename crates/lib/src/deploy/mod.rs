//! Deployment context tracking.
//!
//! A deployment context groups every stage trigger for one
//! (project, service, version) under a single correlation id and remembers
//! the spec hash last triggered per stage.

mod tracker;
mod types;

pub use tracker::{DeploymentTracker, TrackError, TrackOutcome, find_project};
pub use types::{DeploymentContextSpec, DeploymentContextStatus, ServiceDeploymentStatus, context_name};
