//! Persistence layer: pluggable storage for JSON documents.
//!
//! The [`DocumentBackend`] trait is the only thing the store engine knows
//! about storage. Documents are opaque JSON objects grouped in named
//! collections; the backend additionally enforces unique keys atomically.
//! [`MemoryBackend`] serves tests and ephemeral deployments,
//! [`PostgresBackend`] stores documents as JSONB via `sqlx`.

pub mod memory;
pub mod postgres;

use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::Value;

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

use crate::domain::DocumentId;
use crate::error::ControlPlaneError;

/// A field value that must be unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    /// Top-level field name.
    pub field: String,
    /// Canonical (JSON-encoded) field value.
    pub value: String,
}

impl UniqueKey {
    /// Builds the unique keys for `fields` present in `document`.
    ///
    /// Fields that are absent or `null` are not constrained.
    #[must_use]
    pub fn collect(document: &Value, fields: &[&str]) -> Vec<Self> {
        fields
            .iter()
            .filter_map(|field| {
                document
                    .get(*field)
                    .filter(|value| !value.is_null())
                    .map(|value| Self {
                        field: (*field).to_string(),
                        value: value.to_string(),
                    })
            })
            .collect()
    }
}

/// Top-level field equality filter for [`DocumentBackend::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Field name.
    pub field: String,
    /// Value the field must equal.
    pub value: Value,
}

impl FieldFilter {
    /// Returns `true` if `document` satisfies the filter.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        document.get(&self.field) == Some(&self.value)
    }
}

/// Object-safe async storage interface used by the store engine.
///
/// Implementations must make [`insert`](Self::insert) and
/// [`replace`](Self::replace) atomic with respect to unique keys: two
/// concurrent writers claiming the same key must not both succeed.
pub trait DocumentBackend: Send + Sync + fmt::Debug {
    /// Stores a new document.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Conflict`] if any unique key is already held by
    /// another document, [`ControlPlaneError::Persistence`] on backend
    /// failure.
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>>;

    /// Loads one document by id.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Persistence`] on backend failure.
    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<Option<Value>, ControlPlaneError>>;

    /// Lists documents in insertion order, optionally filtered.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Persistence`] on backend failure.
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Option<FieldFilter>,
    ) -> BoxFuture<'a, Result<Vec<Value>, ControlPlaneError>>;

    /// Overwrites an existing document and its unique keys.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if the document vanished,
    /// [`ControlPlaneError::Conflict`] on a unique key clash,
    /// [`ControlPlaneError::Persistence`] on backend failure.
    fn replace<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>>;

    /// Deletes a document, returning whether it existed.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Persistence`] on backend failure.
    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<bool, ControlPlaneError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_keys_skip_missing_and_null_fields() {
        let doc = json!({"host": "a.example", "name": null});
        let keys = UniqueKey::collect(&doc, &["host", "name", "region"]);
        assert_eq!(
            keys,
            vec![UniqueKey {
                field: "host".into(),
                value: "\"a.example\"".into()
            }]
        );
    }

    #[test]
    fn field_filter_compares_top_level_values() {
        let filter = FieldFilter {
            field: "module".into(),
            value: json!("sample"),
        };
        assert!(filter.matches(&json!({"module": "sample"})));
        assert!(!filter.matches(&json!({"module": "audit"})));
        assert!(!filter.matches(&json!({})));
    }
}
