//! Helm values merge for stage delivery.
//!
//! Mappings merge key by key with the overlay winning. Sequences
//! concatenate, overlay items first. Any other overlay value replaces the
//! base value.

use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
  #[error("neither base nor stage values are present")]
  NoValues,

  #[error("failed to parse {which} values: {source}")]
  Parse {
    which: &'static str,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to render merged values: {0}")]
  Render(#[source] serde_yaml::Error),
}

/// Merge two values documents. Either side alone is returned as-is.
pub fn merge_values(base: Option<Value>, overlay: Option<Value>) -> Result<Value, MergeError> {
  match (base, overlay) {
    (Some(base), Some(overlay)) => Ok(merge(base, overlay)),
    (Some(only), None) | (None, Some(only)) => Ok(only),
    (None, None) => Err(MergeError::NoValues),
  }
}

/// [`merge_values`] over YAML text.
pub fn merge_values_str(base: Option<&str>, overlay: Option<&str>) -> Result<String, MergeError> {
  let base = base.map(|s| parse(s, "base")).transpose()?;
  let overlay = overlay.map(|s| parse(s, "stage")).transpose()?;
  let merged = merge_values(base, overlay)?;
  serde_yaml::to_string(&merged).map_err(MergeError::Render)
}

fn parse(content: &str, which: &'static str) -> Result<Value, MergeError> {
  serde_yaml::from_str(content).map_err(|source| MergeError::Parse { which, source })
}

fn merge(base: Value, overlay: Value) -> Value {
  match (base, overlay) {
    (Value::Mapping(mut base), Value::Mapping(overlay)) => {
      for (key, value) in overlay {
        match base.get_mut(&key) {
          Some(slot) => {
            let existing = std::mem::take(slot);
            *slot = merge(existing, value);
          }
          None => {
            base.insert(key, value);
          }
        }
      }
      Value::Mapping(base)
    }
    (Value::Sequence(base), Value::Sequence(mut overlay)) => {
      overlay.extend(base);
      Value::Sequence(overlay)
    }
    (base @ Value::Mapping(_), Value::Null) => base,
    (_, overlay) => overlay,
  }
}
