use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CONFIG_VERSION, EVENT_CONTENT_TYPE, EVENT_SOURCE, EVENT_SPEC_VERSION};
use crate::manifest::ServiceDeploymentSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  pub contenttype: String,
  pub data: EventData,
  pub source: String,
  pub specversion: String,
  #[serde(rename = "type")]
  pub event_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shkeptncontext: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
  pub project: String,
  pub service: String,
  pub stage: String,
  pub image: String,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
  #[serde(default)]
  pub configuration_change: ConfigurationChange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChange {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub values: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventResponse {
  #[serde(default)]
  pub keptn_context: String,
}

/// `sh.keptn.event.<stage>.<sequence>.triggered`
pub fn event_type(stage: &str, sequence: &str) -> String {
  if sequence.ends_with(".triggered") {
    format!("sh.keptn.event.{stage}.{sequence}")
  } else {
    format!("sh.keptn.event.{stage}.{sequence}.triggered")
  }
}

impl TriggerEvent {
  /// Trigger for one stage of a service deployment, chained to `context`
  /// when one is already known.
  pub fn deployment(spec: &ServiceDeploymentSpec, sequence: &str, context: Option<&str>) -> Self {
    let mut labels = BTreeMap::new();
    labels.insert("version".to_string(), spec.version.clone());
    labels.insert(
      "configVersion".to_string(),
      spec
        .config_version
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_VERSION.to_string()),
    );
    if let Some(author) = spec.author.as_ref().filter(|a| !a.is_empty()) {
      labels.insert("author".to_string(), author.clone());
    }
    if let Some(commit) = spec.source_commit_hash.as_ref().filter(|c| !c.is_empty()) {
      labels.insert("sourceCommitHash".to_string(), commit.clone());
    }

    Self {
      contenttype: EVENT_CONTENT_TYPE.to_string(),
      data: EventData {
        project: spec.project.clone(),
        service: spec.service.clone(),
        stage: spec.stage.clone(),
        image: format!("{}:{}", spec.service, spec.version),
        labels,
        configuration_change: ConfigurationChange::default(),
      },
      source: EVENT_SOURCE.to_string(),
      specversion: EVENT_SPEC_VERSION.to_string(),
      event_type: event_type(&spec.stage, sequence),
      shkeptncontext: context.filter(|c| !c.is_empty()).map(str::to_string),
    }
  }
}
