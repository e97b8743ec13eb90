//! Manifests pulled from the source repository.
//!
//! The loader reads the flat `*.yaml`/`*.yml` files directly under the base
//! directory, splits multi-document files, and decodes each document against
//! the closed set of kinds in [`types`]. Bad documents are skipped and counted.

mod loader;
pub mod types;

pub use loader::{LoadReport, ManifestError, decode_kind, load_dir, load_manifests};
pub use types::{
  InstanceSpec, KindSpec, Manifest, ManifestSet, ProjectSpec, ScheduledExecSpec, SequenceExecutionSpec, SequenceSpec,
  ServiceDeploymentSpec, ServiceSpec, StageSpec,
};
