//! Bindings: the unit of pipeline composition.
//!
//! A [`Binding`] ties an HTTP verb and path pattern to a [`Configuration`].
//! Bindings only ever live inside an endpoint's `middleware` or `adapters`
//! list; their position in that list is their execution order.

use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use super::{Configuration, DocumentId};

/// HTTP verb a binding responds to. [`Verb::All`] matches every method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
    /// `CONNECT`
    Connect,
    /// Any method.
    All,
}

impl Verb {
    /// Every accepted verb, in the order they are documented.
    pub const ALL_VERBS: [Self; 10] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
        Self::Trace,
        Self::Connect,
        Self::All,
    ];

    /// Lower-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Patch => "patch",
            Self::Head => "head",
            Self::Options => "options",
            Self::Trace => "trace",
            Self::Connect => "connect",
            Self::All => "all",
        }
    }

    /// Returns `true` if a request with `method` should reach this binding.
    #[must_use]
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Self::All => true,
            verb => method.as_str().eq_ignore_ascii_case(verb.as_str()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    /// Parses a verb case-insensitively (`"GET"`, `"get"` and `"Get"` are
    /// all accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_VERBS
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported verb: {s}"))
    }
}

/// A reference to another record that may or may not have been resolved.
///
/// Stored documents always hold the bare id; read queries replace it with
/// the referenced record when it still exists. A reference whose target was
/// deleted stays [`Reference::Id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    /// The referenced record, embedded inline.
    Resolved(Box<T>),
    /// Only the id is known (unresolved or dangling).
    Id(DocumentId),
}

impl Reference<Configuration> {
    /// Id of the referenced configuration, resolved or not.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Resolved(cfg) => cfg.id,
            Self::Id(id) => *id,
        }
    }

    /// The embedded configuration, if the reference was resolved.
    #[must_use]
    pub fn resolved(&self) -> Option<&Configuration> {
        match self {
            Self::Resolved(cfg) => Some(cfg),
            Self::Id(_) => None,
        }
    }
}

/// One verb + path + configuration triple inside an endpoint pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Store-assigned identifier, unique among all bindings.
    pub id: DocumentId,
    /// HTTP verb the stage is registered for.
    pub verb: Verb,
    /// Path pattern relative to the endpoint namespace.
    pub path: String,
    /// Configuration providing the stage instance.
    pub configuration: Reference<Configuration>,
}
