//! In-memory document backend.
//!
//! [`MemoryBackend`] keeps every collection behind one
//! [`tokio::sync::RwLock`]. Writes take the lock for the whole
//! check-and-write, which is what makes unique keys atomic.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentBackend, FieldFilter, UniqueKey};
use crate::domain::DocumentId;
use crate::error::ControlPlaneError;

/// One named collection: documents in insertion order plus the unique key
/// index.
#[derive(Debug, Default)]
struct Collection {
    documents: Vec<(DocumentId, Value)>,
    keys: HashMap<UniqueKey, DocumentId>,
}

impl Collection {
    fn position(&self, id: DocumentId) -> Option<usize> {
        self.documents.iter().position(|(doc_id, _)| *doc_id == id)
    }

    fn check_keys(&self, id: DocumentId, unique: &[UniqueKey]) -> Result<(), ControlPlaneError> {
        for key in unique {
            if let Some(holder) = self.keys.get(key)
                && *holder != id
            {
                return Err(ControlPlaneError::Conflict(format!(
                    "{} {} is already taken",
                    key.field, key.value
                )));
            }
        }
        Ok(())
    }

    fn claim_keys(&mut self, id: DocumentId, unique: Vec<UniqueKey>) {
        self.keys.retain(|_, holder| *holder != id);
        for key in unique {
            self.keys.insert(key, id);
        }
    }
}

/// Process-local, non-durable document storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentBackend for MemoryBackend {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>> {
        Box::pin(async move {
            let mut map = self.collections.write().await;
            let coll = map.entry(collection.to_string()).or_default();
            if coll.position(id).is_some() {
                return Err(ControlPlaneError::Conflict(format!(
                    "{collection} {id} already exists"
                )));
            }
            coll.check_keys(id, &unique)?;
            coll.claim_keys(id, unique);
            coll.documents.push((id, document));
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<Option<Value>, ControlPlaneError>> {
        Box::pin(async move {
            let map = self.collections.read().await;
            Ok(map.get(collection).and_then(|coll| {
                coll.documents
                    .iter()
                    .find(|(doc_id, _)| *doc_id == id)
                    .map(|(_, doc)| doc.clone())
            }))
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Option<FieldFilter>,
    ) -> BoxFuture<'a, Result<Vec<Value>, ControlPlaneError>> {
        Box::pin(async move {
            let map = self.collections.read().await;
            let Some(coll) = map.get(collection) else {
                return Ok(Vec::new());
            };
            Ok(coll
                .documents
                .iter()
                .map(|(_, doc)| doc)
                .filter(|doc| filter.as_ref().is_none_or(|f| f.matches(doc)))
                .cloned()
                .collect())
        })
    }

    fn replace<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>> {
        Box::pin(async move {
            let mut map = self.collections.write().await;
            let coll = map
                .get_mut(collection)
                .ok_or_else(|| ControlPlaneError::not_found(collection, id))?;
            let index = coll
                .position(id)
                .ok_or_else(|| ControlPlaneError::not_found(collection, id))?;
            coll.check_keys(id, &unique)?;
            coll.claim_keys(id, unique);
            if let Some(slot) = coll.documents.get_mut(index) {
                slot.1 = document;
            }
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<bool, ControlPlaneError>> {
        Box::pin(async move {
            let mut map = self.collections.write().await;
            let Some(coll) = map.get_mut(collection) else {
                return Ok(false);
            };
            let Some(index) = coll.position(id) else {
                return Ok(false);
            };
            coll.documents.remove(index);
            coll.keys.retain(|_, holder| *holder != id);
            Ok(true)
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host_key(host: &str) -> Vec<UniqueKey> {
        UniqueKey::collect(&json!({ "host": host }), &["host"])
    }

    #[tokio::test]
    async fn insert_and_get() {
        let backend = MemoryBackend::new();
        let id = DocumentId::new();
        let result = backend
            .insert("endpoints", id, json!({"id": id, "host": "a"}), Vec::new())
            .await;
        assert!(result.is_ok());

        let Ok(Some(doc)) = backend.get("endpoints", id).await else {
            panic!("document should exist");
        };
        assert_eq!(doc["host"], "a");
    }

    #[tokio::test]
    async fn find_preserves_insertion_order() {
        let backend = MemoryBackend::new();
        for host in ["c", "a", "b"] {
            let id = DocumentId::new();
            let _ = backend
                .insert("endpoints", id, json!({"host": host}), Vec::new())
                .await;
        }
        let Ok(docs) = backend.find("endpoints", None).await else {
            panic!("find failed");
        };
        let hosts: Vec<&str> = docs.iter().filter_map(|d| d["host"].as_str()).collect();
        assert_eq!(hosts, ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn duplicate_unique_key_conflicts() {
        let backend = MemoryBackend::new();
        let first = backend
            .insert("endpoints", DocumentId::new(), json!({}), host_key("a"))
            .await;
        assert!(first.is_ok());

        let second = backend
            .insert("endpoints", DocumentId::new(), json!({}), host_key("a"))
            .await;
        assert!(matches!(second, Err(ControlPlaneError::Conflict(_))));
    }

    #[tokio::test]
    async fn replace_releases_old_keys() {
        let backend = MemoryBackend::new();
        let id = DocumentId::new();
        let _ = backend.insert("endpoints", id, json!({}), host_key("a")).await;
        let replaced = backend.replace("endpoints", id, json!({}), host_key("b")).await;
        assert!(replaced.is_ok());

        let reuse = backend
            .insert("endpoints", DocumentId::new(), json!({}), host_key("a"))
            .await;
        assert!(reuse.is_ok());
    }

    #[tokio::test]
    async fn replace_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let result = backend
            .replace("endpoints", DocumentId::new(), json!({}), Vec::new())
            .await;
        assert!(matches!(result, Err(ControlPlaneError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_reports_existence_and_frees_keys() {
        let backend = MemoryBackend::new();
        let id = DocumentId::new();
        let _ = backend.insert("endpoints", id, json!({}), host_key("a")).await;

        assert!(matches!(backend.delete("endpoints", id).await, Ok(true)));
        assert!(matches!(backend.delete("endpoints", id).await, Ok(false)));

        let reuse = backend
            .insert("endpoints", DocumentId::new(), json!({}), host_key("a"))
            .await;
        assert!(reuse.is_ok());
    }
}
