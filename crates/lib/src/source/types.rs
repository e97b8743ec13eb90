use serde::{Deserialize, Serialize};

use crate::manifest::KindSpec;
use crate::resource::Kind;
use crate::secrets::{SecretDecryptor, SecretError, reveal};
use crate::util::hash::Hashable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
  pub repository: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  /// Access token; may be `rsa:` encrypted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_dir: Option<String>,
}

impl Hashable for GitRepositorySpec {}

impl KindSpec for GitRepositorySpec {
  const KIND: Kind = Kind::GitRepository;
}

impl GitRepositorySpec {
  pub fn branch_or<'a>(&'a self, fallback: &'a str) -> &'a str {
    self.branch.as_deref().filter(|b| !b.is_empty()).unwrap_or(fallback)
  }

  pub fn base_dir_or<'a>(&'a self, fallback: &'a str) -> &'a str {
    self.base_dir.as_deref().filter(|d| !d.is_empty()).unwrap_or(fallback)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResult {
  Successful,
  Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryStatus {
  /// Last commit whose pass completed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_commit: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<SyncResult>,
  /// Unix seconds of the last completed pass.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_synced_at: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

/// Remote location plus plaintext credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct GitCredentials {
  pub remote_uri: String,
  pub user: Option<String>,
  pub token: Option<String>,
}

impl std::fmt::Debug for GitCredentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GitCredentials")
      .field("remote_uri", &self.remote_uri)
      .field("user", &self.user)
      .field("token", &self.token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl GitCredentials {
  pub fn anonymous(remote_uri: impl Into<String>) -> Self {
    Self {
      remote_uri: remote_uri.into(),
      user: None,
      token: None,
    }
  }

  /// Build credentials, decrypting an `rsa:` token.
  pub fn resolve<D: SecretDecryptor + ?Sized>(
    remote_uri: &str,
    user: Option<&str>,
    token: Option<&str>,
    decryptor: &D,
  ) -> Result<Self, SecretError> {
    let token = match token.filter(|t| !t.is_empty()) {
      Some(token) => Some(reveal(token, decryptor)?),
      None => None,
    };
    Ok(Self {
      remote_uri: remote_uri.to_string(),
      user: user.filter(|u| !u.is_empty()).map(str::to_string),
      token,
    })
  }

  pub fn from_spec<D: SecretDecryptor + ?Sized>(spec: &GitRepositorySpec, decryptor: &D) -> Result<Self, SecretError> {
    Self::resolve(
      &spec.repository,
      spec.username.as_deref(),
      spec.password.as_deref(),
      decryptor,
    )
  }

  /// Remote URL with credentials embedded, for http(s) remotes that have a
  /// token and no userinfo yet. Other remotes are returned unchanged.
  pub fn authenticated_url(&self) -> String {
    let Some(token) = self.token.as_deref() else {
      return self.remote_uri.clone();
    };
    let Some((scheme, rest)) = self.remote_uri.split_once("://") else {
      return self.remote_uri.clone();
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if !matches!(scheme, "http" | "https") || authority.contains('@') {
      return self.remote_uri.clone();
    }
    let user = self.user.as_deref().unwrap_or("git");
    format!(
      "{scheme}://{}:{}@{rest}",
      urlencoding::encode(user),
      urlencoding::encode(token)
    )
  }
}
