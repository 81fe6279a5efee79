//! `adapters.echo`: answers with a JSON document describing the request.

use std::sync::Arc;

use serde_json::{Value, json};

use super::{RepeatParams, parse_params, repeat_schema};
use crate::error::ControlPlaneError;
use crate::modules::Plugin;
use crate::pipeline::{RequestContext, Stage, StageOutcome, StageResponse};

/// The `echo` module in the `adapters` package.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

/// Stage built by [`Echo`].
#[derive(Debug, Clone)]
pub struct EchoStage {
    message: String,
}

impl Plugin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> Option<&str> {
        Some("Sample adapter module")
    }

    fn parameter_schema(&self) -> Value {
        repeat_schema()
    }

    fn build(&self, parameters: &Value) -> Result<Arc<dyn Stage>, ControlPlaneError> {
        let params: RepeatParams = parse_params("adapters.echo", parameters)?;
        Ok(Arc::new(EchoStage {
            message: params.render("adapters.echo")?,
        }))
    }
}

impl Stage for EchoStage {
    fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
        let mut body = json!({"message": self.message, "path": ctx.path});
        if !ctx.params.is_empty()
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("params".into(), json!(ctx.params));
        }
        Ok(StageOutcome::Respond(StageResponse::json(&body)))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;

    use super::*;

    #[test]
    fn echoes_message_and_path() {
        let Ok(stage) = Echo.build(&json!({"echo": "hi", "repeat": 2})) else {
            panic!("echo should build");
        };
        let mut ctx = RequestContext::new(Method::GET, "/things");
        let Ok(StageOutcome::Respond(response)) = stage.handle(&mut ctx) else {
            panic!("echo should respond");
        };
        let parsed: Value = serde_json::from_slice(&response.body).unwrap_or_default();
        assert_eq!(parsed, json!({"message": "hihi", "path": "/things"}));
        assert_eq!(response.content_type, "application/json");
    }
}
