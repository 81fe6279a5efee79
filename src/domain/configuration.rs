//! Persisted parameter sets for processing modules.

use serde::{Deserialize, Serialize};

use super::DocumentId;

/// A schema-validated parameter set for one processing module.
///
/// `module` holds the canonical name of the owning module. Parameters are
/// checked against that module's parameter schema before every write; any
/// number of bindings may reference the same configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Canonical name of the module this configuration instantiates.
    pub module: String,
    /// Human-readable name.
    pub name: String,
    /// Module parameters, validated against the module's schema.
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_default_to_empty_object() {
        let id = DocumentId::new();
        let parsed: Result<Configuration, _> = serde_json::from_value(json!({
            "id": id,
            "module": "audit",
            "name": "quiet audit",
        }));
        let Ok(cfg) = parsed else {
            panic!("configuration without parameters should parse");
        };
        assert_eq!(cfg.parameters, json!({}));
        assert!(cfg.description.is_none());
    }

    #[test]
    fn name_is_required() {
        let parsed: Result<Configuration, _> = serde_json::from_value(json!({
            "id": DocumentId::new(),
            "module": "audit",
        }));
        assert!(parsed.is_err());
    }
}
