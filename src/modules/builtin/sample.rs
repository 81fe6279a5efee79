//! `sample`: answers with a repeated string.

use std::sync::Arc;

use serde_json::Value;

use super::{RepeatParams, parse_params, repeat_schema};
use crate::error::ControlPlaneError;
use crate::modules::Plugin;
use crate::pipeline::{RequestContext, Stage, StageOutcome, StageResponse};

/// The `sample` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample;

/// Stage built by [`Sample`]; the body is rendered once at build time.
#[derive(Debug, Clone)]
pub struct SampleStage {
    body: String,
}

impl Plugin for Sample {
    fn name(&self) -> &str {
        "sample"
    }

    fn version(&self) -> Option<&str> {
        Some("1.0")
    }

    fn description(&self) -> Option<&str> {
        Some("Sample middleware module")
    }

    fn parameter_schema(&self) -> Value {
        repeat_schema()
    }

    fn build(&self, parameters: &Value) -> Result<Arc<dyn Stage>, ControlPlaneError> {
        let params: RepeatParams = parse_params(self.name(), parameters)?;
        Ok(Arc::new(SampleStage {
            body: params.render(self.name())?,
        }))
    }
}

impl Stage for SampleStage {
    fn handle(&self, _ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
        Ok(StageOutcome::Respond(StageResponse::text(self.body.clone())))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;

    #[test]
    fn responds_with_repeated_echo() {
        let Ok(stage) = Sample.build(&json!({"echo": "ab", "repeat": 3})) else {
            panic!("sample should build");
        };
        let mut ctx = RequestContext::new(Method::GET, "/");
        assert_eq!(
            stage.handle(&mut ctx).ok(),
            Some(StageOutcome::Respond(StageResponse::text("ababab")))
        );
    }

    #[test]
    fn build_rejects_missing_parameters() {
        assert!(matches!(
            Sample.build(&json!({"echo": "ab"})),
            Err(ControlPlaneError::Validation(_))
        ));
    }
}
