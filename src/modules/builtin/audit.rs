//! `audit`: logs each request and lets the pipeline continue.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use super::parse_params;
use crate::error::ControlPlaneError;
use crate::modules::Plugin;
use crate::pipeline::{RequestContext, Stage, StageOutcome};

/// The `audit` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct Audit;

#[derive(Debug, Clone, Deserialize)]
struct AuditParams {
    echo: String,
}

/// Stage built by [`Audit`].
#[derive(Debug, Clone)]
pub struct AuditStage {
    tag: String,
}

impl Plugin for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    fn version(&self) -> Option<&str> {
        Some("1.0")
    }

    fn description(&self) -> Option<&str> {
        Some("Audit logging middleware")
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "properties": {
                "echo": {"type": "string", "required": true, "description": "Tag written with every entry"},
            }
        })
    }

    fn build(&self, parameters: &Value) -> Result<Arc<dyn Stage>, ControlPlaneError> {
        let params: AuditParams = parse_params(self.name(), parameters)?;
        Ok(Arc::new(AuditStage { tag: params.echo }))
    }
}

impl Stage for AuditStage {
    fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
        tracing::info!(
            tag = %self.tag,
            method = %ctx.method,
            path = %ctx.path,
            body_len = ctx.body.len(),
            "audit"
        );
        ctx.locals
            .insert("audited".into(), Value::String(self.tag.clone()));
        Ok(StageOutcome::Next)
    }
}
