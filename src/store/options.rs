//! Declarative options that parametrize a [`super::DocumentStore`].

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::ControlPlaneError;

/// How one field of a new record is derived from the create input.
#[derive(Debug, Clone, Copy)]
pub enum KeyRule {
    /// Copy the input field with the given name verbatim.
    Copy(&'static str),
    /// Derive the value from the input field of the same name; returning
    /// `None` leaves the field unset.
    Transform(fn(Option<&Value>) -> Option<Value>),
}

/// Ordered projection from create input to stored fields.
///
/// Input fields without a rule are dropped, so clients cannot smuggle in
/// ids, child lists or anything the entity does not declare.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    rules: Vec<(&'static str, KeyRule)>,
}

impl KeyMap {
    /// Creates an empty key map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `field` from the input field of the same name.
    #[must_use]
    pub fn copy(mut self, field: &'static str) -> Self {
        self.rules.push((field, KeyRule::Copy(field)));
        self
    }

    /// Copies `field` from a differently named input field.
    #[must_use]
    pub fn copy_from(mut self, field: &'static str, source: &'static str) -> Self {
        self.rules.push((field, KeyRule::Copy(source)));
        self
    }

    /// Derives `field` with `transform`.
    #[must_use]
    pub fn transform(
        mut self,
        field: &'static str,
        transform: fn(Option<&Value>) -> Option<Value>,
    ) -> Self {
        self.rules.push((field, KeyRule::Transform(transform)));
        self
    }

    /// Projects `input` through the rules.
    #[must_use]
    pub fn project(&self, input: &Value) -> Map<String, Value> {
        let mut out = Map::new();
        for (field, rule) in &self.rules {
            let value = match rule {
                KeyRule::Copy(source) => input.get(*source).cloned(),
                KeyRule::Transform(transform) => transform(input.get(*field)),
            };
            if let Some(value) = value {
                out.insert((*field).to_string(), value);
            }
        }
        out
    }
}

/// Materializes child records for one child key.
///
/// Implementations may consult other stores (the binding factory checks
/// that the referenced configuration exists).
pub trait ChildFactory: Send + Sync + fmt::Debug {
    /// Turns client input into a complete child document carrying a fresh
    /// id.
    ///
    /// # Errors
    ///
    /// Returns a validation, not-found or persistence error when the input
    /// cannot become a child.
    fn create(&self, input: Value) -> BoxFuture<'_, Result<Value, ControlPlaneError>>;

    /// Checks and normalizes a child after a delta was merged into it.
    ///
    /// # Errors
    ///
    /// Same as [`ChildFactory::create`].
    fn revise(&self, child: Value) -> BoxFuture<'_, Result<Value, ControlPlaneError>> {
        Box::pin(async move { Ok(child) })
    }
}

/// A declared child list.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    /// Field holding the ordered child list.
    pub key: &'static str,
    /// Factory used for every child created under `key`.
    pub factory: Arc<dyn ChildFactory>,
}

/// A relationship resolved on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    /// Dotted path to the referencing field, e.g. `middleware.configuration`.
    pub path: &'static str,
    /// Backend collection holding the referenced documents.
    pub collection: &'static str,
}

/// Pre-persistence check run on every create and update.
pub trait DocumentValidator<T>: Send + Sync + fmt::Debug {
    /// Accepts or rejects `document`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason; nothing is persisted.
    fn validate(&self, document: &T) -> Result<(), ControlPlaneError>;
}

/// Configuration of one store instance.
#[derive(Debug)]
pub struct StoreOptions<T> {
    /// Entity name used in event names.
    pub entity_name: &'static str,
    /// Backend collection name.
    pub collection: &'static str,
    /// Field holding the document id.
    pub id_field: &'static str,
    /// Create-input projection.
    pub key_map: KeyMap,
    /// Declared child lists.
    pub child_keys: Vec<ChildSpec>,
    /// Relationships resolved on read.
    pub populate: Vec<Relationship>,
    /// Fields always reported as changed by an update.
    pub mutable_fields: Vec<&'static str>,
    /// Fields whose values must be unique in the collection.
    pub unique_fields: Vec<&'static str>,
    /// Optional pre-persistence validator.
    pub validator: Option<Arc<dyn DocumentValidator<T>>>,
}

impl<T> StoreOptions<T> {
    /// Starts options for `entity_name` stored in `collection`, with `id` as
    /// the id field and everything else empty.
    #[must_use]
    pub fn new(entity_name: &'static str, collection: &'static str) -> Self {
        Self {
            entity_name,
            collection,
            id_field: "id",
            key_map: KeyMap::new(),
            child_keys: Vec::new(),
            populate: Vec::new(),
            mutable_fields: Vec::new(),
            unique_fields: Vec::new(),
            validator: None,
        }
    }

    /// Sets the create-input projection.
    #[must_use]
    pub fn key_map(mut self, key_map: KeyMap) -> Self {
        self.key_map = key_map;
        self
    }

    /// Declares a child list.
    #[must_use]
    pub fn child(mut self, key: &'static str, factory: Arc<dyn ChildFactory>) -> Self {
        self.child_keys.push(ChildSpec { key, factory });
        self
    }

    /// Declares a relationship resolved on read.
    #[must_use]
    pub fn populate(mut self, path: &'static str, collection: &'static str) -> Self {
        self.populate.push(Relationship { path, collection });
        self
    }

    /// Declares a field that every update reports as changed.
    #[must_use]
    pub fn mutable(mut self, field: &'static str) -> Self {
        self.mutable_fields.push(field);
        self
    }

    /// Declares a unique field.
    #[must_use]
    pub fn unique(mut self, field: &'static str) -> Self {
        self.unique_fields.push(field);
        self
    }

    /// Installs a pre-persistence validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn DocumentValidator<T>>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Looks up a declared child list.
    #[must_use]
    pub fn child_spec(&self, key: &str) -> Option<&ChildSpec> {
        self.child_keys.iter().find(|spec| spec.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lowercase(value: Option<&Value>) -> Option<Value> {
        value
            .and_then(Value::as_str)
            .map(|s| Value::String(s.to_ascii_lowercase()))
    }

    fn default_path(value: Option<&Value>) -> Option<Value> {
        Some(value.cloned().unwrap_or_else(|| json!("/")))
    }

    #[test]
    fn project_copies_and_transforms() {
        let map = KeyMap::new()
            .copy("host")
            .copy_from("name", "title")
            .transform("verb", lowercase)
            .transform("path", default_path);
        let out = map.project(&json!({
            "host": "a.example",
            "title": "Alpha",
            "verb": "GET",
            "id": "ignored",
        }));
        assert_eq!(
            Value::Object(out),
            json!({"host": "a.example", "name": "Alpha", "verb": "get", "path": "/"})
        );
    }

    #[test]
    fn missing_copy_source_leaves_field_unset() {
        let out = KeyMap::new().copy("region").project(&json!({}));
        assert!(out.is_empty());
    }
}
