//! Secret token handling.
//!
//! Credentials are stored as `user:token` pairs. A token of the form
//! `rsa:<base64>` is RSA-OAEP ciphertext and must be decrypted before use;
//! any other token is plaintext and passes through unchanged.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use thiserror::Error;

pub const ENCRYPTED_PREFIX: &str = "rsa:";

const OAEP_LABEL: &str = "OAEP Encrypted";

#[derive(Debug, Error)]
pub enum SecretError {
  #[error("token is encrypted but no private key is configured")]
  MissingKey,

  #[error("invalid private key: {0}")]
  InvalidKey(#[source] rsa::pkcs1::Error),

  #[error("encrypted token is not valid base64: {0}")]
  Base64(#[source] base64::DecodeError),

  #[error("failed to decrypt token: {0}")]
  Decrypt(#[source] rsa::Error),

  #[error("decrypted token is not valid UTF-8: {0}")]
  Utf8(#[source] std::string::FromUtf8Error),
}

pub trait SecretDecryptor: Send + Sync {
  fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError>;
}

/// Used when no private key is configured. Plaintext tokens still work.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecryptor;

impl SecretDecryptor for NoDecryptor {
  fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
    Err(SecretError::MissingKey)
  }
}

/// RSA-OAEP (SHA-256) decryption with a PKCS#1 PEM private key.
pub struct RsaDecryptor {
  key: RsaPrivateKey,
}

impl RsaDecryptor {
  pub fn from_pem(pem: &str) -> Result<Self, SecretError> {
    let key = RsaPrivateKey::from_pkcs1_pem(pem).map_err(SecretError::InvalidKey)?;
    Ok(Self { key })
  }
}

impl std::fmt::Debug for RsaDecryptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("RsaDecryptor { .. }")
  }
}

impl SecretDecryptor for RsaDecryptor {
  fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
    self
      .key
      .decrypt(Oaep::new_with_label::<Sha256, _>(OAEP_LABEL), ciphertext)
      .map_err(SecretError::Decrypt)
  }
}

/// Build a decryptor from an optional PEM key.
pub fn decryptor_from_pem(pem: Option<&str>) -> Result<Box<dyn SecretDecryptor>, SecretError> {
  match pem {
    Some(pem) if !pem.trim().is_empty() => Ok(Box::new(RsaDecryptor::from_pem(pem)?)),
    _ => Ok(Box::new(NoDecryptor)),
  }
}

/// Return the plaintext form of `token`.
pub fn reveal<D: SecretDecryptor + ?Sized>(token: &str, decryptor: &D) -> Result<String, SecretError> {
  let Some(encoded) = token.strip_prefix(ENCRYPTED_PREFIX) else {
    return Ok(token.to_string());
  };
  let ciphertext = BASE64_STANDARD.decode(encoded.trim()).map_err(SecretError::Base64)?;
  let plaintext = decryptor.decrypt(&ciphertext)?;
  String::from_utf8(plaintext).map_err(SecretError::Utf8)
}
