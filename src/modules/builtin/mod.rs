//! Processing modules shipped with the control plane.
//!
//! | canonical name  | behaviour                                          |
//! |-----------------|----------------------------------------------------|
//! | `audit`         | logs the request with a tag and continues          |
//! | `sample`        | responds with `echo` repeated `repeat` times       |
//! | `adapters.echo` | responds with JSON `{message, path}`               |

pub mod audit;
pub mod echo;
pub mod sample;

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::UnitTree;
use crate::error::ControlPlaneError;

/// The unit tree holding every built-in module.
#[must_use]
pub fn units() -> UnitTree {
    UnitTree::new()
        .unit(Arc::new(audit::Audit))
        .unit(Arc::new(sample::Sample))
        .package("adapters", UnitTree::new().unit(Arc::new(echo::Echo)))
}

/// Parameters shared by `sample` and `adapters.echo`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepeatParams {
    pub(crate) echo: String,
    pub(crate) repeat: f64,
}

/// Largest repeat count the schema admits.
pub(crate) const MAX_REPEAT: u32 = 1000;

/// Largest rendered body, in bytes.
pub(crate) const MAX_RENDER_BYTES: usize = 64 * 1024;

impl RepeatParams {
    /// `echo` concatenated `repeat` times; fractional counts round up.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Validation`] if the count exceeds
    /// [`MAX_REPEAT`] or the result would exceed [`MAX_RENDER_BYTES`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn render(&self, module: &str) -> Result<String, ControlPlaneError> {
        let times = self.repeat.max(0.0).ceil();
        if times > f64::from(MAX_REPEAT) {
            return Err(ControlPlaneError::Validation(format!(
                "invalid parameters for module {module}: repeat must be <= {MAX_REPEAT}"
            )));
        }
        let times = times as usize;
        match self.echo.len().checked_mul(times) {
            Some(len) if len <= MAX_RENDER_BYTES => Ok(self.echo.repeat(times)),
            _ => Err(ControlPlaneError::Validation(format!(
                "invalid parameters for module {module}: rendered body exceeds {MAX_RENDER_BYTES} bytes"
            ))),
        }
    }
}

pub(crate) fn repeat_schema() -> Value {
    json!({
        "properties": {
            "echo": {"type": "string", "required": true, "description": "The string to echo"},
            "repeat": {"type": "number", "minimum": 1, "maximum": MAX_REPEAT, "required": true},
        }
    })
}

pub(crate) fn parse_params<P: DeserializeOwned>(
    module: &str,
    parameters: &Value,
) -> Result<P, ControlPlaneError> {
    serde_json::from_value(parameters.clone()).map_err(|e| {
        ControlPlaneError::Validation(format!("invalid parameters for module {module}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_repeats_echo() {
        let params = RepeatParams {
            echo: "ab".into(),
            repeat: 3.0,
        };
        assert_eq!(params.render("sample").ok().as_deref(), Some("ababab"));
        let params = RepeatParams {
            echo: "x".into(),
            repeat: 1.5,
        };
        assert_eq!(params.render("sample").ok().as_deref(), Some("xx"));
    }

    #[test]
    fn render_rejects_oversized_output() {
        let huge = RepeatParams {
            echo: "ab".into(),
            repeat: 1e19,
        };
        assert!(matches!(
            huge.render("sample"),
            Err(ControlPlaneError::Validation(_))
        ));

        let long = RepeatParams {
            echo: "x".repeat(MAX_RENDER_BYTES),
            repeat: 2.0,
        };
        assert!(matches!(
            long.render("sample"),
            Err(ControlPlaneError::Validation(_))
        ));
    }
}
