//! `url` links attached to every record returned by the admin surface.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use serde::Serialize;
use serde_json::Value;

use crate::app_state::AppState;
use crate::domain::{Binding, Configuration, DocumentId, Endpoint, PipelineKey};
use crate::error::ControlPlaneError;
use crate::modules::ModuleDescriptor;

/// Scheme and authority the request was addressed to: the configured
/// public base URL, else `http://` plus the `Host` header.
#[must_use]
pub fn base_url(public_base_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = public_base_url {
        return base.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

/// Builds absolute admin URLs and decorates records with them.
#[derive(Debug, Clone)]
pub struct AdminLinks {
    admin_root: String,
}

impl AdminLinks {
    /// Links rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            admin_root: format!("{}/admin", base_url.trim_end_matches('/')),
        }
    }

    /// Absolute URL of an admin path such as `/endpoints/<id>`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.admin_root)
    }

    /// A configuration with its `url`.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Internal`] if the record does not serialize.
    pub fn configuration(&self, cfg: &Configuration) -> Result<Value, ControlPlaneError> {
        let mut value = to_object(cfg)?;
        insert_url(&mut value, self.url(&format!("/configurations/{}", cfg.id)));
        Ok(value)
    }

    /// A binding with its `url`, and its configuration's `url` when the
    /// reference is resolved.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Internal`] if the record does not serialize.
    pub fn binding(
        &self,
        endpoint: DocumentId,
        key: PipelineKey,
        binding: &Binding,
    ) -> Result<Value, ControlPlaneError> {
        let mut value = to_object(binding)?;
        insert_url(
            &mut value,
            self.url(&format!("/endpoints/{endpoint}/{key}/{}", binding.id)),
        );
        if let Some(cfg) = binding.configuration.resolved()
            && let Some(obj) = value.as_object_mut()
        {
            obj.insert("configuration".into(), self.configuration(cfg)?);
        }
        Ok(value)
    }

    /// An endpoint with its `url` and every binding linked.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Internal`] if the record does not serialize.
    pub fn endpoint(&self, endpoint: &Endpoint) -> Result<Value, ControlPlaneError> {
        let mut value = to_object(endpoint)?;
        insert_url(&mut value, self.url(&format!("/endpoints/{}", endpoint.id)));
        for key in PipelineKey::BOTH {
            let bindings = endpoint
                .bindings(key)
                .iter()
                .map(|b| self.binding(endpoint.id, key, b))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert(key.as_str().into(), Value::Array(bindings));
            }
        }
        Ok(value)
    }

    /// A module descriptor with its `url` and linked configurations.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Internal`] if the descriptor does not serialize.
    pub fn module(&self, module: &ModuleDescriptor) -> Result<Value, ControlPlaneError> {
        let mut value = to_object(module)?;
        insert_url(
            &mut value,
            self.url(&format!("/modules/{}", module.canonical_name)),
        );
        let configurations = module
            .configurations
            .iter()
            .map(|cfg| self.configuration(cfg))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("configurations".into(), Value::Array(configurations));
        }
        Ok(value)
    }
}

impl FromRequestParts<AppState> for AdminLinks {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::new(&base_url(
            state.public_base_url.as_deref(),
            &parts.headers,
        )))
    }
}

fn to_object<T: Serialize>(record: &T) -> Result<Value, ControlPlaneError> {
    serde_json::to_value(record)
        .map_err(|e| ControlPlaneError::Internal(format!("cannot serialize record: {e}")))
}

fn insert_url(value: &mut Value, url: String) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("url".into(), Value::String(url));
    }
}
