//! kgitops-lib: GitOps synchronization for Keptn
//!
//! This crate holds everything the controller does between "a commit landed
//! in the source repository" and "the control plane was told to deploy":
//! - `manifest`: decoding the manifests checked into the source repository
//! - `sync`: idempotent upserts keyed on a structural spec hash
//! - `driver`: the ordered apply pass and the scheduler that repeats it
//! - `promotion`: tagging artifacts into the upstream repository and
//!   delivering them to stage branches
//! - `deploy`: per-release deployment contexts and sequence triggers

pub mod config;
pub mod consts;
pub mod controlplane;
pub mod deploy;
pub mod driver;
pub mod events;
pub mod manifest;
pub mod platform;
pub mod promotion;
pub mod resource;
pub mod secrets;
pub mod source;
pub mod sync;
pub mod util;
