//! Child factory for the `middleware` and `adapters` lists of an endpoint.

use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::domain::{Configuration, DocumentId, Verb};
use crate::error::ControlPlaneError;
use crate::store::{ChildFactory, DocumentStore};

/// Turns admin input into binding documents.
///
/// The verb is lower-cased and checked, the path defaults to `/`, and the
/// configuration reference (a bare id or an object carrying one) must name
/// an existing configuration.
#[derive(Debug, Clone)]
pub struct BindingFactory {
    configurations: DocumentStore<Configuration>,
}

impl BindingFactory {
    /// Creates a factory that checks references against `configurations`.
    #[must_use]
    pub fn new(configurations: DocumentStore<Configuration>) -> Self {
        Self { configurations }
    }

    async fn normalize(&self, input: &Value, id: DocumentId) -> Result<Value, ControlPlaneError> {
        if !input.is_object() {
            return Err(ControlPlaneError::InvalidRequest(
                "binding must be a JSON object".into(),
            ));
        }

        let verb: Verb = match input.get("verb") {
            Some(Value::String(raw)) => raw.parse().map_err(ControlPlaneError::Validation)?,
            Some(_) => return Err(ControlPlaneError::Validation("verb must be a string".into())),
            None => return Err(ControlPlaneError::Validation("verb is required".into())),
        };

        let path = match input.get("path") {
            None | Some(Value::Null) => "/".to_string(),
            Some(Value::String(path)) if path.is_empty() => "/".to_string(),
            Some(Value::String(path)) => path.clone(),
            Some(_) => return Err(ControlPlaneError::Validation("path must be a string".into())),
        };

        let configuration = configuration_id(input.get("configuration"))?;
        self.configurations.by_id(configuration).await?;

        Ok(json!({
            "id": id,
            "verb": verb.as_str(),
            "path": path,
            "configuration": configuration,
        }))
    }
}

fn configuration_id(raw: Option<&Value>) -> Result<DocumentId, ControlPlaneError> {
    let raw = match raw {
        Some(Value::Object(obj)) => obj.get("id"),
        other => other,
    };
    match raw {
        Some(Value::String(s)) => s.parse().map_err(|_| {
            ControlPlaneError::Validation(format!("configuration {s} is not a valid id"))
        }),
        Some(_) => Err(ControlPlaneError::Validation(
            "configuration must be an id".into(),
        )),
        None => Err(ControlPlaneError::Validation(
            "configuration is required".into(),
        )),
    }
}

impl ChildFactory for BindingFactory {
    fn create(&self, input: Value) -> BoxFuture<'_, Result<Value, ControlPlaneError>> {
        Box::pin(async move { self.normalize(&input, DocumentId::new()).await })
    }

    fn revise(&self, child: Value) -> BoxFuture<'_, Result<Value, ControlPlaneError>> {
        Box::pin(async move {
            let id = child
                .get("id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ControlPlaneError::Internal("binding lost its id".into()))?;
            self.normalize(&child, id).await
        })
    }
}
