//! Endpoints: named routing namespaces with ordered pipelines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Binding, DocumentId};

/// A routing namespace with a unique host and two ordered pipelines.
///
/// Requests for the endpoint run through every matching `middleware`
/// binding first, then every matching `adapters` binding, each list in
/// stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Store-assigned identifier; also the endpoint's namespace segment.
    pub id: DocumentId,
    /// Host name, unique across all endpoints.
    pub host: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deployment region label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Middleware stage bindings, in execution order.
    #[serde(default)]
    pub middleware: Vec<Binding>,
    /// Adapter stage bindings, in execution order.
    #[serde(default)]
    pub adapters: Vec<Binding>,
}

impl Endpoint {
    /// Namespace path the endpoint's pipeline is mounted under.
    #[must_use]
    pub fn namespace(&self) -> String {
        format!("/{}", self.id)
    }

    /// All bindings in execution order: middleware first, then adapters.
    pub fn stages(&self) -> impl Iterator<Item = &Binding> {
        self.middleware.iter().chain(self.adapters.iter())
    }

    /// Bindings held under the given pipeline key.
    #[must_use]
    pub fn bindings(&self, key: PipelineKey) -> &[Binding] {
        match key {
            PipelineKey::Middleware => &self.middleware,
            PipelineKey::Adapters => &self.adapters,
        }
    }
}

/// The two child lists an endpoint owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKey {
    /// The `middleware` list.
    Middleware,
    /// The `adapters` list.
    Adapters,
}

impl PipelineKey {
    /// Both keys, in execution order.
    pub const BOTH: [Self; 2] = [Self::Middleware, Self::Adapters];

    /// Field name of the list inside an endpoint document.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Middleware => "middleware",
            Self::Adapters => "adapters",
        }
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "middleware" => Ok(Self::Middleware),
            "adapters" => Ok(Self::Adapters),
            other => Err(format!("unknown pipeline: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Reference, Verb};

    fn binding(path: &str) -> Binding {
        Binding {
            id: DocumentId::new(),
            verb: Verb::All,
            path: path.to_string(),
            configuration: Reference::Id(DocumentId::new()),
        }
    }

    #[test]
    fn stages_run_middleware_before_adapters() {
        let endpoint = Endpoint {
            id: DocumentId::new(),
            host: "api.example.com".into(),
            name: None,
            description: None,
            region: None,
            middleware: vec![binding("/a"), binding("/b")],
            adapters: vec![binding("/c")],
        };
        let paths: Vec<&str> = endpoint.stages().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
    }

    #[test]
    fn namespace_is_derived_from_id() {
        let id = DocumentId::new();
        let endpoint = Endpoint {
            id,
            host: "h".into(),
            name: None,
            description: None,
            region: None,
            middleware: Vec::new(),
            adapters: Vec::new(),
        };
        assert_eq!(endpoint.namespace(), format!("/{id}"));
    }

    #[test]
    fn pipeline_key_round_trips_through_str() {
        for key in PipelineKey::BOTH {
            assert_eq!(key.as_str().parse::<PipelineKey>(), Ok(key));
        }
        assert!("handlers".parse::<PipelineKey>().is_err());
    }
}
