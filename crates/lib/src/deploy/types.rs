use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `<project>-<service>-<version>`
pub fn context_name(project: &str, service: &str, version: &str) -> String {
  format!("{project}-{service}-{version}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContextSpec {
  pub project: String,
  pub service: String,
  pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentContextStatus {
  /// Stage name to the spec hash last triggered for it.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub last_applied_hash: BTreeMap<String, String>,
  #[serde(default)]
  pub keptn_context: String,
}

impl DeploymentContextStatus {
  /// Correlation id to chain the next trigger to, if one was minted.
  pub fn chained_context(&self) -> Option<&str> {
    Some(self.keptn_context.as_str()).filter(|c| !c.is_empty())
  }

  /// Drop stage hashes for stages not in `known`, keeping `current`.
  /// Returns the pruned stage names.
  pub fn prune_stages(&mut self, known: &[String], current: &str) -> Vec<String> {
    let stale: Vec<String> = self
      .last_applied_hash
      .keys()
      .filter(|stage| stage.as_str() != current && !known.contains(stage))
      .cloned()
      .collect();
    for stage in &stale {
      self.last_applied_hash.remove(stage);
    }
    stale
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeploymentStatus {
  #[serde(default)]
  pub keptn_context: String,
  #[serde(default)]
  pub last_applied_hash: String,
  #[serde(default)]
  pub update_pending: bool,
}
