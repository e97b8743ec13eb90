//! HTTP client for the control plane event API.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{CreateEventResponse, TriggerEvent};
use crate::consts::{CLOUDEVENTS_CONTENT_TYPE, DEFAULT_AUTH_HEADER};
use crate::manifest::InstanceSpec;
use crate::secrets::{SecretDecryptor, SecretError, reveal};

#[derive(Debug, Error)]
pub enum ControlPlaneError {
  #[error("no control plane API URL configured")]
  MissingUrl,

  #[error("failed to build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("request to '{url}' failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("control plane at '{url}' returned {status}: {body}")]
  Status { url: String, status: u16, body: String },

  #[error("invalid response from '{url}': {source}")]
  Response {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to resolve API token: {0}")]
  Secret(#[from] SecretError),
}

/// Where and how to reach the control plane.
#[derive(Clone)]
pub struct Endpoint {
  pub api_url: String,
  pub auth_header: String,
  pub token: Option<String>,
}

impl std::fmt::Debug for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Endpoint")
      .field("api_url", &self.api_url)
      .field("auth_header", &self.auth_header)
      .field("token", &self.token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl Endpoint {
  pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
    Self {
      api_url: api_url.into(),
      auth_header: DEFAULT_AUTH_HEADER.to_string(),
      token,
    }
  }

  /// Build from an Instance record, falling back to `fallback_url` when the
  /// instance has no URL. The token is decrypted if needed.
  pub fn from_instance<D: SecretDecryptor + ?Sized>(
    instance: Option<&InstanceSpec>,
    fallback_url: Option<&str>,
    decryptor: &D,
  ) -> Result<Self, ControlPlaneError> {
    let api_url = instance
      .map(|i| i.api_url.as_str())
      .filter(|u| !u.is_empty())
      .or(fallback_url.filter(|u| !u.is_empty()))
      .ok_or(ControlPlaneError::MissingUrl)?;

    let token = match instance.and_then(|i| i.api_token.as_deref()).filter(|t| !t.is_empty()) {
      Some(token) => Some(reveal(token, decryptor)?),
      None => None,
    };

    let mut endpoint = Self::new(api_url, token);
    if let Some(header) = instance.and_then(|i| i.token_type.as_deref()).filter(|h| !h.is_empty()) {
      endpoint.auth_header = header.to_string();
    }
    Ok(endpoint)
  }

  pub fn event_url(&self) -> String {
    format!("{}/v1/event", self.api_url.trim_end_matches('/'))
  }
}

/// Sends trigger events and returns the correlation context id.
pub trait ControlPlane: Send + Sync {
  fn send_event(
    &self,
    endpoint: &Endpoint,
    event: &TriggerEvent,
  ) -> impl Future<Output = Result<String, ControlPlaneError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpControlPlane {
  client: reqwest::Client,
}

impl HttpControlPlane {
  pub fn new(timeout: Duration) -> Result<Self, ControlPlaneError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(ControlPlaneError::Client)?;
    Ok(Self { client })
  }
}

impl ControlPlane for HttpControlPlane {
  async fn send_event(&self, endpoint: &Endpoint, event: &TriggerEvent) -> Result<String, ControlPlaneError> {
    let url = endpoint.event_url();
    info!(url = %url, event_type = %event.event_type, "sending trigger event");

    let mut request = self
      .client
      .post(&url)
      .header(CONTENT_TYPE, CLOUDEVENTS_CONTENT_TYPE)
      .json(event);
    if let Some(token) = &endpoint.token {
      request = request.header(endpoint.auth_header.as_str(), token);
    }

    let response = request.send().await.map_err(|source| ControlPlaneError::Request {
      url: url.clone(),
      source,
    })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ControlPlaneError::Status {
        url,
        status: status.as_u16(),
        body,
      });
    }

    let created: CreateEventResponse = response
      .json()
      .await
      .map_err(|source| ControlPlaneError::Response { url: url.clone(), source })?;
    debug!(keptn_context = %created.keptn_context, "event accepted");
    Ok(created.keptn_context)
  }
}
