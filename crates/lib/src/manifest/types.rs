//! Typed specs for the manifest kinds synced from Git.
//!
//! Field names follow the camelCase YAML the repositories are written in.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::resource::Kind;
use crate::util::hash::Hashable;

/// A spec type bound to one resource kind.
pub trait KindSpec: Serialize + DeserializeOwned + Clone + fmt::Debug + Hashable {
  const KIND: Kind;

  /// Identity used when a manifest carries no `metadata.name`.
  fn derived_name(&self) -> Option<String> {
    None
  }
}

/// One decoded document: identity plus typed spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest<S> {
  pub name: String,
  pub spec: S,
}

impl<S> Manifest<S> {
  pub fn new(name: impl Into<String>, spec: S) -> Self {
    Self {
      name: name.into(),
      spec,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
  #[serde(default)]
  pub api_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
  pub sequence: SequenceDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDefinition {
  pub name: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub triggered_on: Vec<SequenceTrigger>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tasks: Vec<SequenceTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTrigger {
  pub event: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub selector: Option<TriggerSelector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSelector {
  #[serde(rename = "match", default)]
  pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceTask {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub triggered_after: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
  pub project: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub sequence: Vec<StageSequence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSequence {
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub sequence_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sequence_ref: Option<String>,
}

/// A project, including the upstream repository artifacts are promoted to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repository: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  /// Upstream token; may be `rsa:` encrypted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
  pub project: String,
  pub service: String,
  /// Sequence triggered when a deployment of this service changes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger: Option<String>,
  #[serde(rename = "startstage", default, skip_serializing_if = "Option::is_none")]
  pub start_stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExecutionSpec {
  pub project: String,
  pub service: String,
  pub stage: String,
  pub event: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledExecSpec {
  /// RFC 3339 timestamp.
  pub start_time: String,
  pub sequence_execution_template: SequenceExecutionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeploymentSpec {
  pub project: String,
  pub service: String,
  pub stage: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub config_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_commit_hash: Option<String>,
}

impl Hashable for InstanceSpec {}
impl Hashable for SequenceSpec {}
impl Hashable for StageSpec {}
impl Hashable for ProjectSpec {}
impl Hashable for ServiceSpec {}
impl Hashable for SequenceExecutionSpec {}
impl Hashable for ScheduledExecSpec {}
impl Hashable for ServiceDeploymentSpec {}

impl KindSpec for InstanceSpec {
  const KIND: Kind = Kind::Instance;
}

impl KindSpec for SequenceSpec {
  const KIND: Kind = Kind::Sequence;

  fn derived_name(&self) -> Option<String> {
    Some(self.sequence.name.clone()).filter(|n| !n.is_empty())
  }
}

impl KindSpec for StageSpec {
  const KIND: Kind = Kind::Stage;
}

impl KindSpec for ProjectSpec {
  const KIND: Kind = Kind::Project;

  fn derived_name(&self) -> Option<String> {
    self.project.clone().filter(|p| !p.is_empty())
  }
}

impl KindSpec for ServiceSpec {
  const KIND: Kind = Kind::Service;

  fn derived_name(&self) -> Option<String> {
    Some(format!("{}-{}", self.project, self.service))
  }
}

impl KindSpec for SequenceExecutionSpec {
  const KIND: Kind = Kind::SequenceExecution;
}

impl KindSpec for ScheduledExecSpec {
  const KIND: Kind = Kind::ScheduledExecution;
}

impl KindSpec for ServiceDeploymentSpec {
  const KIND: Kind = Kind::ServiceDeployment;

  fn derived_name(&self) -> Option<String> {
    Some(format!("{}-{}-{}", self.project, self.service, self.stage))
  }
}

/// Everything decoded from one checkout, bucketed by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestSet {
  pub instances: Vec<Manifest<InstanceSpec>>,
  pub sequences: Vec<Manifest<SequenceSpec>>,
  pub stages: Vec<Manifest<StageSpec>>,
  pub projects: Vec<Manifest<ProjectSpec>>,
  pub services: Vec<Manifest<ServiceSpec>>,
  pub sequence_executions: Vec<Manifest<SequenceExecutionSpec>>,
  pub scheduled_executions: Vec<Manifest<ScheduledExecSpec>>,
  pub service_deployments: Vec<Manifest<ServiceDeploymentSpec>>,
}

impl ManifestSet {
  pub fn len(&self) -> usize {
    self.instances.len()
      + self.sequences.len()
      + self.stages.len()
      + self.projects.len()
      + self.services.len()
      + self.sequence_executions.len()
      + self.scheduled_executions.len()
      + self.service_deployments.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
