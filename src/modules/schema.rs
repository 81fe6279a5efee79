//! Parameter schemas declared by modules.
//!
//! A schema lists named properties with a type, an optional `required`
//! flag and, for numbers, optional bounds:
//!
//! ```json
//! {"properties": {"echo": {"type": "string", "required": true},
//!                 "repeat": {"type": "number", "minimum": 1, "required": true}}}
//! ```
//!
//! Properties not declared by the schema are accepted as-is.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlPlaneError;

/// JSON type a property must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// A JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

impl PropertyType {
    fn admits(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Constraints on one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySchema {
    /// Required JSON type.
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Inclusive lower bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The parameter schema of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Declared parameters by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
}

impl ParameterSchema {
    /// Parses and checks a schema declared as JSON.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect if `raw` is not a well-formed
    /// schema.
    pub fn parse(raw: &Value) -> Result<Self, String> {
        let schema: Self = serde_json::from_value(raw.clone()).map_err(|e| e.to_string())?;
        for (name, prop) in &schema.properties {
            let numeric = matches!(prop.kind, PropertyType::Number | PropertyType::Integer);
            if !numeric && (prop.minimum.is_some() || prop.maximum.is_some()) {
                return Err(format!("{name}: bounds are only allowed on numbers"));
            }
            if let (Some(min), Some(max)) = (prop.minimum, prop.maximum)
                && min > max
            {
                return Err(format!("{name}: minimum {min} exceeds maximum {max}"));
            }
        }
        Ok(schema)
    }

    /// Checks `parameters` against the schema, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Validation`] listing all violations.
    pub fn validate(&self, parameters: &Value) -> Result<(), ControlPlaneError> {
        let Some(params) = parameters.as_object() else {
            return Err(ControlPlaneError::Validation(
                "parameters must be a JSON object".into(),
            ));
        };

        let mut violations = Vec::new();
        for (name, prop) in &self.properties {
            let Some(value) = params.get(name).filter(|v| !v.is_null()) else {
                if prop.required {
                    violations.push(format!("{name} is required"));
                }
                continue;
            };
            if !prop.kind.admits(value) {
                violations.push(format!("{name} must be of type {}", prop.kind));
                continue;
            }
            if let Some(n) = value.as_f64() {
                if let Some(min) = prop.minimum
                    && n < min
                {
                    violations.push(format!("{name} must be at least {min}"));
                }
                if let Some(max) = prop.maximum
                    && n > max
                {
                    violations.push(format!("{name} must be at most {max}"));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ControlPlaneError::Validation(violations.join("; ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ParameterSchema {
        let Ok(schema) = ParameterSchema::parse(&json!({
            "properties": {
                "echo": {"type": "string", "required": true},
                "repeat": {"type": "number", "minimum": 1, "required": true},
            }
        })) else {
            panic!("sample schema should parse");
        };
        schema
    }

    #[test]
    fn accepts_conforming_parameters() {
        assert!(sample().validate(&json!({"echo": "ab", "repeat": 3})).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let Err(ControlPlaneError::Validation(msg)) = sample().validate(&json!({"repeat": 0}))
        else {
            panic!("expected validation error");
        };
        assert!(msg.contains("echo is required"));
        assert!(msg.contains("repeat must be at least 1"));
    }

    #[test]
    fn rejects_wrong_types() {
        let result = sample().validate(&json!({"echo": 5, "repeat": "3"}));
        let Err(ControlPlaneError::Validation(msg)) = result else {
            panic!("expected validation error");
        };
        assert!(msg.contains("echo must be of type string"));
        assert!(msg.contains("repeat must be of type number"));
    }

    #[test]
    fn undeclared_parameters_pass() {
        assert!(
            sample()
                .validate(&json!({"echo": "a", "repeat": 1, "extra": true}))
                .is_ok()
        );
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        assert!(ParameterSchema::parse(&json!({"properties": {"x": {"type": "date"}}})).is_err());
        assert!(
            ParameterSchema::parse(&json!({"properties": {"x": {"type": "string", "minimum": 1}}}))
                .is_err()
        );
        assert!(ParameterSchema::parse(&json!({"properties": []})).is_err());
        assert!(ParameterSchema::parse(&json!({})).is_ok());
    }
}
