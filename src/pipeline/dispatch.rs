//! Per-endpoint dispatch tables.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::{RequestContext, Stage, StageOutcome, StageResponse};
use crate::domain::{DocumentId, Verb};
use crate::error::ControlPlaneError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest,
}

/// A compiled binding path.
///
/// Segments match literally, `:name` captures one segment under `name`, a
/// trailing `*` matches whatever remains (including nothing). Empty
/// segments are ignored, so trailing slashes do not matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles `pattern`.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let last = parts.len().saturating_sub(1);
        let segments = parts
            .iter()
            .enumerate()
            .map(|(i, part)| match *part {
                "*" if i == last => Segment::Rest,
                p => match p.strip_prefix(':') {
                    Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                    _ => Segment::Literal(p.to_string()),
                },
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path`, returning the captured parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = HashMap::new();
        for segment in &self.segments {
            match segment {
                Segment::Rest => return Some(params),
                Segment::Literal(lit) => {
                    if parts.next()? != lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), parts.next()?.to_string());
                }
            }
        }
        parts.next().is_none().then_some(params)
    }
}

/// One mounted stage.
#[derive(Debug, Clone)]
pub struct MountedStage {
    /// Binding the stage was built from.
    pub binding: DocumentId,
    /// Method filter.
    pub verb: Verb,
    /// Path filter.
    pub pattern: PathPattern,
    /// The stage itself.
    pub stage: Arc<dyn Stage>,
}

/// The live pipeline of one endpoint: its stages in execution order.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    endpoint: DocumentId,
    stages: Vec<MountedStage>,
}

impl DispatchTable {
    /// Creates an empty table for `endpoint`.
    #[must_use]
    pub fn new(endpoint: DocumentId) -> Self {
        Self {
            endpoint,
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    pub fn push(&mut self, binding: DocumentId, verb: Verb, path: &str, stage: Arc<dyn Stage>) {
        self.stages.push(MountedStage {
            binding,
            verb,
            pattern: PathPattern::parse(path),
            stage,
        });
    }

    /// The endpoint this table serves.
    #[must_use]
    pub fn endpoint(&self) -> DocumentId {
        self.endpoint
    }

    /// Binding ids in execution order.
    #[must_use]
    pub fn stage_order(&self) -> Vec<DocumentId> {
        self.stages.iter().map(|s| s.binding).collect()
    }

    /// Mounted stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[MountedStage] {
        &self.stages
    }

    /// Runs the matching stages in order until one responds.
    ///
    /// A stage that fails or panics ends this request with
    /// [`ControlPlaneError::StageFailure`]; the table itself is unaffected.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::StageFailure`] as above, or
    /// [`ControlPlaneError::NotFound`] when no stage responds.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> Result<StageResponse, ControlPlaneError> {
        for mounted in &self.stages {
            if !mounted.verb.matches(&ctx.method) {
                continue;
            }
            let Some(params) = mounted.pattern.matches(&ctx.path) else {
                continue;
            };
            ctx.params = params;

            let outcome = catch_unwind(AssertUnwindSafe(|| mounted.stage.handle(ctx)));
            match outcome {
                Ok(Ok(StageOutcome::Next)) => {}
                Ok(Ok(StageOutcome::Respond(response))) => return Ok(response),
                Ok(Err(err)) => {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        binding = %mounted.binding,
                        error = %err,
                        "stage failed"
                    );
                    return Err(ControlPlaneError::StageFailure {
                        binding: mounted.binding.to_string(),
                        message: err.to_string(),
                    });
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "stage panicked".to_string());
                    tracing::error!(
                        endpoint = %self.endpoint,
                        binding = %mounted.binding,
                        %message,
                        "stage panicked"
                    );
                    return Err(ControlPlaneError::StageFailure {
                        binding: mounted.binding.to_string(),
                        message,
                    });
                }
            }
        }
        Err(ControlPlaneError::not_found(
            "route",
            format!("{} {}", ctx.method, ctx.path),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;

    use super::*;

    #[derive(Debug)]
    struct Mark(&'static str);

    impl Stage for Mark {
        fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
            let trail = ctx
                .locals
                .get("trail")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            ctx.locals
                .insert("trail".into(), format!("{trail}{}", self.0).into());
            Ok(StageOutcome::Next)
        }
    }

    #[derive(Debug)]
    struct Reply;

    impl Stage for Reply {
        fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
            let trail = ctx
                .locals
                .get("trail")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(StageOutcome::Respond(StageResponse::text(trail)))
        }
    }

    #[derive(Debug)]
    struct Explode;

    impl Stage for Explode {
        #[allow(clippy::panic)]
        fn handle(&self, _ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
            panic!("boom");
        }
    }

    #[test]
    fn pattern_literals_params_and_rest() {
        let users = PathPattern::parse("/users/:id");
        let Some(params) = users.matches("/users/42") else {
            panic!("should match");
        };
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(users.matches("/users").is_none());
        assert!(users.matches("/users/42/extra").is_none());
        assert!(users.matches("/users/42/").is_some());

        let rest = PathPattern::parse("/files/*");
        assert!(rest.matches("/files/a/b/c").is_some());
        assert!(rest.matches("/files").is_some());
        assert!(rest.matches("/other").is_none());

        assert!(PathPattern::parse("/").matches("/").is_some());
        assert!(PathPattern::parse("/").matches("/x").is_none());
        assert!(PathPattern::parse("*").matches("/anything/at/all").is_some());
    }

    #[test]
    fn stages_run_in_order_until_one_responds() {
        let mut table = DispatchTable::new(DocumentId::new());
        table.push(DocumentId::new(), Verb::All, "*", Arc::new(Mark("a")));
        table.push(DocumentId::new(), Verb::Post, "*", Arc::new(Mark("x")));
        table.push(DocumentId::new(), Verb::Get, "/hello", Arc::new(Mark("b")));
        table.push(DocumentId::new(), Verb::Get, "/hello", Arc::new(Reply));
        table.push(DocumentId::new(), Verb::Get, "/hello", Arc::new(Mark("never")));

        let mut ctx = RequestContext::new(Method::GET, "/hello");
        let Ok(response) = table.dispatch(&mut ctx) else {
            panic!("dispatch should respond");
        };
        assert_eq!(response, StageResponse::text("ab"));
    }

    #[test]
    fn falling_off_the_end_is_not_found() {
        let mut table = DispatchTable::new(DocumentId::new());
        table.push(DocumentId::new(), Verb::All, "*", Arc::new(Mark("a")));
        let mut ctx = RequestContext::new(Method::GET, "/");
        assert!(matches!(
            table.dispatch(&mut ctx),
            Err(ControlPlaneError::NotFound { .. })
        ));
    }

    #[test]
    fn panicking_stage_fails_only_the_request() {
        let bad = DocumentId::new();
        let mut table = DispatchTable::new(DocumentId::new());
        table.push(bad, Verb::Get, "/boom", Arc::new(Explode));
        table.push(DocumentId::new(), Verb::Get, "/ok", Arc::new(Reply));

        let mut ctx = RequestContext::new(Method::GET, "/boom");
        let Err(ControlPlaneError::StageFailure { binding, message }) = table.dispatch(&mut ctx)
        else {
            panic!("expected stage failure");
        };
        assert_eq!(binding, bad.to_string());
        assert_eq!(message, "boom");

        let mut ctx = RequestContext::new(Method::GET, "/ok");
        assert!(table.dispatch(&mut ctx).is_ok());
    }
}
