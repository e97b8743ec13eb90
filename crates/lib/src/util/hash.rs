//! Hashing utilities for idempotent sync.
//!
//! This module provides:
//! - `SpecHash`: the decimal structural hash stored in the last-applied annotation
//! - `Hashable`: computes a `SpecHash` for any serializable spec
//! - `ContentHash` / `hash_bytes()`: full SHA-256 over arbitrary bytes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub type HashError = serde_json::Error;

/// Structural hash of a spec, rendered as a decimal `u64`.
///
/// Object keys are sorted before hashing, so two specs that differ only in
/// map iteration order hash identically. List order is significant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecHash(pub String);

impl SpecHash {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for SpecHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn spec_hash(&self) -> Result<SpecHash, HashError> {
    structural_hash(self)
  }
}

/// Compute the structural hash of any serializable value.
pub fn structural_hash<T: Serialize + ?Sized>(value: &T) -> Result<SpecHash, HashError> {
  let value = serde_json::to_value(value)?;
  let mut canonical = String::new();
  write_canonical(&value, &mut canonical);

  let digest = Sha256::digest(canonical.as_bytes());
  let mut prefix = [0u8; 8];
  prefix.copy_from_slice(&digest[..8]);
  Ok(SpecHash(u64::from_be_bytes(prefix).to_string()))
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<_> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (key, item)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(item, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

/// A full 64-character SHA256 hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::{BTreeMap, HashMap};

  #[derive(Serialize)]
  struct Spec {
    project: String,
    labels: HashMap<String, String>,
    stages: Vec<String>,
  }

  impl Hashable for Spec {}

  fn spec(labels: &[(&str, &str)], stages: &[&str]) -> Spec {
    Spec {
      project: "demo".to_string(),
      labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
      stages: stages.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn hash_is_decimal() {
    let hash = spec(&[], &[]).spec_hash().unwrap();
    assert!(hash.as_str().parse::<u64>().is_ok());
  }

  #[test]
  fn hash_is_deterministic() {
    let a = spec(&[("version", "1.0.0")], &["dev"]).spec_hash().unwrap();
    let b = spec(&[("version", "1.0.0")], &["dev"]).spec_hash().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn map_order_does_not_matter() {
    let forward = spec(&[("a", "1"), ("b", "2"), ("c", "3")], &[]);
    let backward = spec(&[("c", "3"), ("b", "2"), ("a", "1")], &[]);
    assert_eq!(forward.spec_hash().unwrap(), backward.spec_hash().unwrap());

    let mut sorted = BTreeMap::new();
    sorted.insert("a", "1");
    sorted.insert("b", "2");
    let mut unsorted = HashMap::new();
    unsorted.insert("b", "2");
    unsorted.insert("a", "1");
    assert_eq!(structural_hash(&sorted).unwrap(), structural_hash(&unsorted).unwrap());
  }

  #[test]
  fn list_order_matters() {
    let a = spec(&[], &["dev", "prod"]).spec_hash().unwrap();
    let b = spec(&[], &["prod", "dev"]).spec_hash().unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn hash_changes_with_content() {
    let a = spec(&[("version", "1.0.0")], &[]).spec_hash().unwrap();
    let b = spec(&[("version", "1.0.1")], &[]).spec_hash().unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn hash_bytes_is_full_sha256() {
    let hash = hash_bytes(b"hello world");
    assert_eq!(hash.0.len(), 64);
    assert_eq!(hash, hash_bytes(b"hello world"));
    assert_ne!(hash, hash_bytes(b"hello"));
  }
}
