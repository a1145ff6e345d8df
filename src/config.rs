use std::path::Path;

use crate::compositor::ComposeOptions;
use crate::error::{ComposeError, Result};

impl ComposeOptions {
    /// Load options from a JSON file; absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ComposeError::InvalidConfiguration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let parse_error = |e: serde_json::Error| {
            ComposeError::InvalidConfiguration(format!("Failed to parse {}: {}", path.display(), e))
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(parse_error)?;
        for key in unknown_keys(&value) {
            tracing::warn!(config = %path.display(), "Ignoring unknown option {key:?}");
        }
        let options: ComposeOptions = serde_json::from_value(value).map_err(parse_error)?;
        options.layout.validate().map_err(|e| ComposeError::InvalidConfiguration(e.to_string()))?;
        Ok(options)
    }
}

/// Top-level keys of `value` that no `ComposeOptions` field reads.
///
/// The flattened layout fields rule out `deny_unknown_fields`, so the known
/// set comes from serializing the defaults.
pub(crate) fn unknown_keys(value: &serde_json::Value) -> Vec<String> {
    let Some(given) = value.as_object() else {
        return Vec::new();
    };
    let known = serde_json::to_value(ComposeOptions::default()).unwrap_or_default();
    let known = known.as_object();
    given
        .keys()
        .filter(|key| !known.is_some_and(|k| k.contains_key(key.as_str())))
        .cloned()
        .collect()
}
