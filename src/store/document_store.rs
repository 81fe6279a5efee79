//! Generic document store: CRUD, child CRUD, relationship resolution and
//! event emission for any entity kind.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::merge::{merge, touched_fields};
use super::options::{ChildSpec, Relationship, StoreOptions};
use super::populate::{collapse, resolve};
use super::Document;
use crate::domain::{DocumentId, EventBus, StoreEvent};
use crate::error::ControlPlaneError;
use crate::persistence::{DocumentBackend, FieldFilter, UniqueKey};

/// Result of a child mutation: the parent after the write plus the child
/// that was added, updated or removed.
#[derive(Debug, Clone)]
pub struct ChildChange<T> {
    /// Parent record after the mutation, relationships resolved.
    pub parent: T,
    /// The affected child, relationships resolved where it still exists.
    pub child: Value,
}

/// Store instance for one entity kind.
///
/// Every mutation follows the same pattern: load → apply → validate →
/// persist → resolve relationships → emit event → return. Writes are
/// read-then-write without optimistic locking: two concurrent updates of the
/// same record race and the last write wins. Only unique fields are
/// protected atomically, by the backend.
#[derive(Debug)]
pub struct DocumentStore<T> {
    backend: Arc<dyn DocumentBackend>,
    bus: EventBus,
    options: Arc<StoreOptions<T>>,
}

impl<T> Clone for DocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bus: self.bus.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

impl<T: Document> DocumentStore<T> {
    /// Creates a store over `backend`, publishing on `bus`.
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentBackend>, bus: EventBus, options: StoreOptions<T>) -> Self {
        Self {
            backend,
            bus,
            options: Arc::new(options),
        }
    }

    /// The options this store was built with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions<T> {
        &self.options
    }

    /// Creates a record from plain input projected through the key map.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::InvalidRequest`] if `input` is not an object,
    /// [`ControlPlaneError::Validation`] if the projected record is
    /// malformed or rejected by the validator,
    /// [`ControlPlaneError::Conflict`] on a unique field clash.
    pub async fn create(&self, input: &Value) -> Result<T, ControlPlaneError> {
        self.require_object(input)?;
        let mut fields = self.options.key_map.project(input);
        let id = DocumentId::new();
        fields.insert(
            self.options.id_field.to_string(),
            Value::String(id.to_string()),
        );
        for spec in &self.options.child_keys {
            fields
                .entry(spec.key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
        }

        let mut document = Value::Object(fields);
        collapse(&self.options.populate, self.options.id_field, &mut document);
        self.check(&document)?;
        let unique = UniqueKey::collect(&document, &self.options.unique_fields);
        self.backend
            .insert(self.options.collection, id, document.clone(), unique)
            .await?;

        let (record, _) = self.materialize(document).await?;
        tracing::info!(entity = self.options.entity_name, %id, "record created");
        self.publish(StoreEvent::Created {
            record: record.to_entity(),
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    /// Merges `delta` into the stored record.
    ///
    /// The id cannot be changed and child lists cannot be replaced through
    /// an update; use the child operations instead.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if no record has `id`, otherwise as
    /// for [`DocumentStore::create`].
    pub async fn update(&self, id: DocumentId, delta: &Value) -> Result<T, ControlPlaneError> {
        self.require_object(delta)?;
        let mut delta = delta.clone();
        if let Some(obj) = delta.as_object_mut() {
            obj.remove(self.options.id_field);
            if let Some(spec) = self
                .options
                .child_keys
                .iter()
                .find(|spec| obj.contains_key(spec.key))
            {
                return Err(ControlPlaneError::InvalidRequest(format!(
                    "{} cannot be replaced by an update",
                    spec.key
                )));
            }
        }

        let mut document = self.fetch_raw(id).await?;
        merge(&delta, &mut document);

        let mut changed = touched_fields(&delta);
        for field in &self.options.mutable_fields {
            if !changed.iter().any(|c| c == field) {
                changed.push((*field).to_string());
            }
        }

        let (record, _) = self.write(id, document).await?;
        tracing::info!(entity = self.options.entity_name, %id, ?changed, "record updated");
        self.publish(StoreEvent::Updated {
            record: record.to_entity(),
            changed,
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    /// Deletes a record, returning it as it was.
    ///
    /// Records referencing the deleted one are left untouched.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if no record has `id`.
    pub async fn remove(&self, id: DocumentId) -> Result<T, ControlPlaneError> {
        let document = self.fetch_raw(id).await?;
        let (record, _) = self.materialize(document).await?;
        if !self.backend.delete(self.options.collection, id).await? {
            return Err(self.missing(id));
        }
        tracing::info!(entity = self.options.entity_name, %id, "record deleted");
        self.publish(StoreEvent::Deleted {
            record: record.to_entity(),
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    /// Lists every record in storage order, relationships resolved.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list(&self) -> Result<Vec<T>, ControlPlaneError> {
        let documents = self.backend.find(self.options.collection, None).await?;
        self.materialize_all(documents).await
    }

    /// Lists records whose top-level `key` equals `value`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn search_by_key(&self, key: &str, value: Value) -> Result<Vec<T>, ControlPlaneError> {
        let filter = FieldFilter {
            field: key.to_string(),
            value,
        };
        let documents = self
            .backend
            .find(self.options.collection, Some(filter))
            .await?;
        self.materialize_all(documents).await
    }

    /// Loads one record, relationships resolved.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if no record has `id`.
    pub async fn by_id(&self, id: DocumentId) -> Result<T, ControlPlaneError> {
        let document = self.fetch_raw(id).await?;
        Ok(self.materialize(document).await?.0)
    }

    /// Loads one child of a record.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::InvalidRequest`] for an undeclared child key,
    /// [`ControlPlaneError::NotFound`] if the parent or child is missing.
    pub async fn child_by_id<C: DeserializeOwned>(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        child_id: DocumentId,
    ) -> Result<C, ControlPlaneError> {
        self.child_spec(child_key)?;
        let (_, resolved) = self.materialize(self.fetch_raw(parent_id).await?).await?;
        let child = self
            .children(&resolved, child_key)
            .iter()
            .find(|child| self.has_id(child, child_id))
            .cloned()
            .ok_or_else(|| self.missing_child(child_key, child_id))?;
        decode(child)
    }

    /// Lists the children under `child_key`, in order.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::InvalidRequest`] for an undeclared child key,
    /// [`ControlPlaneError::NotFound`] if the parent is missing.
    pub async fn list_child<C: DeserializeOwned>(
        &self,
        parent_id: DocumentId,
        child_key: &str,
    ) -> Result<Vec<C>, ControlPlaneError> {
        self.child_spec(child_key)?;
        let (_, resolved) = self.materialize(self.fetch_raw(parent_id).await?).await?;
        self.children(&resolved, child_key)
            .iter()
            .cloned()
            .map(decode)
            .collect()
    }

    /// Materializes a child through the key's factory and appends it.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::InvalidRequest`] for an undeclared child key,
    /// [`ControlPlaneError::NotFound`] if the parent is missing, or any
    /// error raised by the child factory.
    pub async fn create_child(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        input: &Value,
    ) -> Result<ChildChange<T>, ControlPlaneError> {
        let spec = self.child_spec(child_key)?;
        let mut document = self.fetch_raw(parent_id).await?;
        let child = spec.factory.create(input.clone()).await?;
        let child_id = self.id_of(&child)?;
        self.children_mut(&mut document, child_key)?.push(child);

        let (parent, resolved) = self.write(parent_id, document).await?;
        let child = self.find_child(&resolved, child_key, child_id)?;
        tracing::info!(
            entity = self.options.entity_name,
            %parent_id,
            child_key,
            %child_id,
            "child added"
        );
        self.publish(StoreEvent::ChildAdded {
            parent: parent.to_entity(),
            child_key: child_key.to_string(),
            child: child.clone(),
            timestamp: Utc::now(),
        });
        Ok(ChildChange { parent, child })
    }

    /// Appends several children in one write, each through the factory.
    ///
    /// A single `add` event carrying all new children is emitted.
    ///
    /// # Errors
    ///
    /// As for [`DocumentStore::create_child`]; nothing is written if any
    /// child is rejected.
    pub async fn add_children(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        inputs: &[Value],
    ) -> Result<T, ControlPlaneError> {
        let spec = self.child_spec(child_key)?;
        let mut document = self.fetch_raw(parent_id).await?;
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            created.push(spec.factory.create(input.clone()).await?);
        }
        let ids = created
            .iter()
            .map(|child| self.id_of(child))
            .collect::<Result<Vec<_>, _>>()?;
        self.children_mut(&mut document, child_key)?
            .extend(created);

        let (parent, resolved) = self.write(parent_id, document).await?;
        let children: Vec<Value> = self
            .children(&resolved, child_key)
            .iter()
            .filter(|child| ids.iter().any(|id| self.has_id(child, *id)))
            .cloned()
            .collect();
        tracing::info!(
            entity = self.options.entity_name,
            %parent_id,
            child_key,
            count = children.len(),
            "children added"
        );
        self.publish(StoreEvent::ChildAdded {
            parent: parent.to_entity(),
            child_key: child_key.to_string(),
            child: Value::Array(children),
            timestamp: Utc::now(),
        });
        Ok(parent)
    }

    /// Merges `delta` into one child.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if the parent or child is missing,
    /// or any error raised by the factory's revision check.
    pub async fn update_child(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        child_id: DocumentId,
        delta: &Value,
    ) -> Result<ChildChange<T>, ControlPlaneError> {
        let spec = self.child_spec(child_key)?;
        self.require_object(delta)?;
        let mut delta = delta.clone();
        if let Some(obj) = delta.as_object_mut() {
            obj.remove(self.options.id_field);
        }

        let mut document = self.fetch_raw(parent_id).await?;
        let children = self.children_mut(&mut document, child_key)?;
        let position = children
            .iter()
            .position(|child| self.has_id(child, child_id))
            .ok_or_else(|| self.missing_child(child_key, child_id))?;
        let mut child = children
            .get(position)
            .cloned()
            .ok_or_else(|| self.missing_child(child_key, child_id))?;
        collapse(&self.relationships_under(child_key), self.options.id_field, &mut child);
        merge(&delta, &mut child);
        let child = spec.factory.revise(child).await?;
        if let Some(slot) = children.get_mut(position) {
            *slot = child;
        }

        let (parent, resolved) = self.write(parent_id, document).await?;
        let child = self.find_child(&resolved, child_key, child_id)?;
        tracing::info!(
            entity = self.options.entity_name,
            %parent_id,
            child_key,
            %child_id,
            "child updated"
        );
        self.publish(StoreEvent::ChildUpdated {
            parent: parent.to_entity(),
            child_key: child_key.to_string(),
            child: child.clone(),
            timestamp: Utc::now(),
        });
        Ok(ChildChange { parent, child })
    }

    /// Removes one child.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if the parent or child is missing.
    pub async fn delete_child_by_id(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        child_id: DocumentId,
    ) -> Result<ChildChange<T>, ControlPlaneError> {
        self.child_spec(child_key)?;
        let document = self.fetch_raw(parent_id).await?;
        let (_, mut resolved) = self.materialize(document).await?;
        let children = self.children_mut(&mut resolved, child_key)?;
        let position = children
            .iter()
            .position(|child| self.has_id(child, child_id))
            .ok_or_else(|| self.missing_child(child_key, child_id))?;
        let removed = children.remove(position);

        let (parent, _) = self.write(parent_id, resolved).await?;
        tracing::info!(
            entity = self.options.entity_name,
            %parent_id,
            child_key,
            %child_id,
            "child deleted"
        );
        self.publish(StoreEvent::ChildDeleted {
            parent: parent.to_entity(),
            child_key: child_key.to_string(),
            child: removed.clone(),
            timestamp: Utc::now(),
        });
        Ok(ChildChange {
            parent,
            child: removed,
        })
    }

    /// Replaces the order of the children under `child_key`.
    ///
    /// `order` must be a permutation of the current child ids: same length,
    /// same ids. Otherwise nothing changes.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::Reorder`] if `order` is not a permutation,
    /// [`ControlPlaneError::NotFound`] if the parent is missing.
    pub async fn reorder_children(
        &self,
        parent_id: DocumentId,
        child_key: &str,
        order: &[DocumentId],
    ) -> Result<T, ControlPlaneError> {
        self.child_spec(child_key)?;
        let mut document = self.fetch_raw(parent_id).await?;
        let children = self.children_mut(&mut document, child_key)?;
        if children.len() != order.len() {
            return Err(ControlPlaneError::Reorder(format!(
                "expected {} ids for {child_key}, got {}",
                children.len(),
                order.len()
            )));
        }

        let mut remaining: Vec<Option<Value>> = children.drain(..).map(Some).collect();
        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let taken = remaining
                .iter_mut()
                .find(|slot| matches!(slot, Some(child) if self.has_id(child, *id)))
                .and_then(|slot| slot.take());
            match taken {
                Some(child) => reordered.push(child),
                None => {
                    return Err(ControlPlaneError::Reorder(format!(
                        "{id} is not a current {child_key} id or is repeated"
                    )));
                }
            }
        }
        *children = reordered;

        let (parent, _) = self.write(parent_id, document).await?;
        tracing::info!(
            entity = self.options.entity_name,
            %parent_id,
            child_key,
            "children reordered"
        );
        self.publish(StoreEvent::ChildrenReordered {
            parent: parent.to_entity(),
            child_key: child_key.to_string(),
            timestamp: Utc::now(),
        });
        Ok(parent)
    }

    // -- internals --------------------------------------------------------

    fn require_object(&self, input: &Value) -> Result<(), ControlPlaneError> {
        if input.is_object() {
            Ok(())
        } else {
            Err(ControlPlaneError::InvalidRequest(format!(
                "{} input must be a JSON object",
                self.options.entity_name
            )))
        }
    }

    fn child_spec(&self, key: &str) -> Result<&ChildSpec, ControlPlaneError> {
        self.options.child_spec(key).ok_or_else(|| {
            ControlPlaneError::InvalidRequest(format!(
                "{} has no child list named {key}",
                self.options.entity_name
            ))
        })
    }

    fn missing(&self, id: DocumentId) -> ControlPlaneError {
        ControlPlaneError::not_found(self.options.entity_name, id)
    }

    fn missing_child(&self, child_key: &str, child_id: DocumentId) -> ControlPlaneError {
        ControlPlaneError::not_found(
            format!("{}.{child_key}", self.options.entity_name),
            child_id,
        )
    }

    /// Relationship paths scoped under `child_key`, re-rooted at the child.
    fn relationships_under(&self, child_key: &str) -> Vec<Relationship> {
        self.options
            .populate
            .iter()
            .filter_map(|rel| {
                rel.path
                    .strip_prefix(child_key)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map(|path| Relationship {
                        path,
                        collection: rel.collection,
                    })
            })
            .collect()
    }

    fn has_id(&self, child: &Value, id: DocumentId) -> bool {
        child
            .get(self.options.id_field)
            .and_then(Value::as_str)
            .is_some_and(|s| s == id.to_string())
    }

    fn id_of(&self, child: &Value) -> Result<DocumentId, ControlPlaneError> {
        child
            .get(self.options.id_field)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ControlPlaneError::Internal(format!(
                    "child factory for {} produced a child without an id",
                    self.options.entity_name
                ))
            })
    }

    fn children<'v>(&self, document: &'v Value, child_key: &str) -> &'v [Value] {
        document
            .get(child_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn children_mut<'v>(
        &self,
        document: &'v mut Value,
        child_key: &str,
    ) -> Result<&'v mut Vec<Value>, ControlPlaneError> {
        let obj = document.as_object_mut().ok_or_else(|| {
            ControlPlaneError::Internal(format!(
                "stored {} is not an object",
                self.options.entity_name
            ))
        })?;
        let slot = obj
            .entry(child_key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        slot.as_array_mut().ok_or_else(|| {
            ControlPlaneError::Internal(format!(
                "{}.{child_key} is not a list",
                self.options.entity_name
            ))
        })
    }

    fn find_child(
        &self,
        document: &Value,
        child_key: &str,
        child_id: DocumentId,
    ) -> Result<Value, ControlPlaneError> {
        self.children(document, child_key)
            .iter()
            .find(|child| self.has_id(child, child_id))
            .cloned()
            .ok_or_else(|| self.missing_child(child_key, child_id))
    }

    async fn fetch_raw(&self, id: DocumentId) -> Result<Value, ControlPlaneError> {
        self.backend
            .get(self.options.collection, id)
            .await?
            .ok_or_else(|| self.missing(id))
    }

    /// Decodes and validates a document in its stored (collapsed) form.
    fn check(&self, document: &Value) -> Result<T, ControlPlaneError> {
        let record: T = serde_json::from_value(document.clone()).map_err(|e| {
            ControlPlaneError::Validation(format!("invalid {}: {e}", self.options.entity_name))
        })?;
        if let Some(validator) = &self.options.validator {
            validator.validate(&record)?;
        }
        Ok(record)
    }

    /// Collapses, validates and replaces the stored document, then returns
    /// the resolved record and its JSON form.
    async fn write(&self, id: DocumentId, mut document: Value) -> Result<(T, Value), ControlPlaneError> {
        collapse(&self.options.populate, self.options.id_field, &mut document);
        self.check(&document)?;
        let unique = UniqueKey::collect(&document, &self.options.unique_fields);
        self.backend
            .replace(self.options.collection, id, document.clone(), unique)
            .await?;
        self.materialize(document).await
    }

    async fn materialize(&self, mut document: Value) -> Result<(T, Value), ControlPlaneError> {
        resolve(&*self.backend, &self.options.populate, &mut document).await?;
        let record = serde_json::from_value(document.clone()).map_err(|e| {
            ControlPlaneError::Internal(format!(
                "stored {} does not decode: {e}",
                self.options.entity_name
            ))
        })?;
        Ok((record, document))
    }

    async fn materialize_all(&self, documents: Vec<Value>) -> Result<Vec<T>, ControlPlaneError> {
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            records.push(self.materialize(document).await?.0);
        }
        Ok(records)
    }

    /// Emits an event. Subscriber failures are logged, never returned: the
    /// mutation is already persisted.
    fn publish(&self, event: StoreEvent) {
        if let Err(err) = self.bus.publish(&event) {
            tracing::error!(
                event = %event.name(),
                error = %err,
                "store event subscriber failed"
            );
        }
    }
}

fn decode<C: DeserializeOwned>(value: Value) -> Result<C, ControlPlaneError> {
    serde_json::from_value(value)
        .map_err(|e| ControlPlaneError::Internal(format!("child does not decode: {e}")))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use crate::domain::{Binding, Endpoint};
    use crate::persistence::MemoryBackend;
    use crate::store::{ChildFactory, ENDPOINTS, KeyMap};

    #[derive(Debug)]
    struct StampId;

    impl ChildFactory for StampId {
        fn create(&self, mut input: Value) -> BoxFuture<'_, Result<Value, ControlPlaneError>> {
            Box::pin(async move {
                if let Some(obj) = input.as_object_mut() {
                    obj.insert("id".into(), Value::String(DocumentId::new().to_string()));
                }
                Ok(input)
            })
        }
    }

    fn endpoint_store(bus: EventBus) -> DocumentStore<Endpoint> {
        let factory: Arc<dyn ChildFactory> = Arc::new(StampId);
        let options = StoreOptions::new("Endpoint", ENDPOINTS)
            .key_map(KeyMap::new().copy("host").copy("name").copy("region"))
            .child("middleware", Arc::clone(&factory))
            .child("adapters", factory)
            .unique("host");
        DocumentStore::new(Arc::new(MemoryBackend::new()), bus, options)
    }

    fn binding_input() -> Value {
        json!({"verb": "get", "path": "/", "configuration": DocumentId::new()})
    }

    fn counter(bus: &EventBus, name: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        bus.subscribe(name, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        count
    }

    #[tokio::test]
    async fn create_assigns_id_and_empty_child_lists() {
        let bus = EventBus::new();
        let created = counter(&bus, "store.create.Endpoint");
        let store = endpoint_store(bus);

        let Ok(endpoint) = store
            .create(&json!({"host": "a.example", "id": "ignored", "middleware": [1]}))
            .await
        else {
            panic!("create should succeed");
        };
        assert_eq!(endpoint.host, "a.example");
        assert!(endpoint.middleware.is_empty());
        assert!(endpoint.adapters.is_empty());
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let Ok(loaded) = store.by_id(endpoint.id).await else {
            panic!("created endpoint should load");
        };
        assert_eq!(loaded, endpoint);
    }

    #[tokio::test]
    async fn create_rejects_malformed_records() {
        let store = endpoint_store(EventBus::new());
        let result = store.create(&json!({"name": "no host"})).await;
        assert!(matches!(result, Err(ControlPlaneError::Validation(_))));
        assert!(matches!(store.list().await, Ok(list) if list.is_empty()));

        let result = store.create(&json!("not an object")).await;
        assert!(matches!(result, Err(ControlPlaneError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn concurrent_duplicate_hosts_yield_exactly_one_conflict() {
        let store = endpoint_store(EventBus::new());
        let input = json!({"host": "dup.example"});
        let (first, second) = tokio::join!(store.create(&input), store.create(&input));
        let conflicts = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(ControlPlaneError::Conflict(_))))
            .count();
        assert_eq!(conflicts, 1);
        assert!(first.is_ok() || second.is_ok());
        assert!(matches!(store.list().await, Ok(list) if list.len() == 1));
    }

    #[tokio::test]
    async fn update_merges_and_reports_changed_fields() {
        let bus = EventBus::new();
        let changed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&changed);
        bus.subscribe("store.update.Endpoint", move |event| {
            if let StoreEvent::Updated { changed, .. } = event
                && let Ok(mut sink) = sink.lock()
            {
                sink.clone_from(changed);
            }
            Ok(())
        });
        let store = endpoint_store(bus);
        let Ok(endpoint) = store.create(&json!({"host": "a.example", "name": "A"})).await else {
            panic!("create should succeed");
        };

        let Ok(updated) = store
            .update(endpoint.id, &json!({"region": "eu", "id": DocumentId::new()}))
            .await
        else {
            panic!("update should succeed");
        };
        assert_eq!(updated.id, endpoint.id);
        assert_eq!(updated.region.as_deref(), Some("eu"));
        assert_eq!(updated.name.as_deref(), Some("A"));
        let Ok(changed) = changed.lock() else {
            panic!("lock poisoned");
        };
        assert_eq!(*changed, vec!["region".to_string()]);
    }

    #[tokio::test]
    async fn update_refuses_to_replace_child_lists() {
        let store = endpoint_store(EventBus::new());
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };
        let result = store.update(endpoint.id, &json!({"adapters": []})).await;
        assert!(matches!(result, Err(ControlPlaneError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn remove_returns_record_then_not_found() {
        let bus = EventBus::new();
        let deleted = counter(&bus, "store.delete.Endpoint");
        let store = endpoint_store(bus);
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };
        assert!(matches!(store.remove(endpoint.id).await, Ok(e) if e.id == endpoint.id));
        assert!(matches!(
            store.remove(endpoint.id).await,
            Err(ControlPlaneError::NotFound { .. })
        ));
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn search_by_key_filters_on_top_level_fields() {
        let store = endpoint_store(EventBus::new());
        let _ = store.create(&json!({"host": "a.example", "region": "eu"})).await;
        let _ = store.create(&json!({"host": "b.example", "region": "us"})).await;
        let Ok(found) = store.search_by_key("region", json!("us")).await else {
            panic!("search should succeed");
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().map(|e| e.host.as_str()), Some("b.example"));
    }

    #[tokio::test]
    async fn child_lifecycle_emits_keyed_events() {
        let bus = EventBus::new();
        let added = counter(&bus, "store.add.Endpoint.adapters");
        let updated = counter(&bus, "store.update.Endpoint.adapters");
        let removed = counter(&bus, "store.delete.Endpoint.adapters");
        let store = endpoint_store(bus);
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };

        let Ok(change) = store
            .create_child(endpoint.id, "adapters", &binding_input())
            .await
        else {
            panic!("create_child should succeed");
        };
        assert_eq!(change.parent.adapters.len(), 1);
        let Ok(child_id) = store.id_of(&change.child) else {
            panic!("child should carry an id");
        };

        let Ok(change) = store
            .update_child(endpoint.id, "adapters", child_id, &json!({"path": "/echo"}))
            .await
        else {
            panic!("update_child should succeed");
        };
        assert_eq!(change.child["path"], json!("/echo"));
        let Ok(binding) = store
            .child_by_id::<Binding>(endpoint.id, "adapters", child_id)
            .await
        else {
            panic!("child_by_id should succeed");
        };
        assert_eq!(binding.path, "/echo");

        assert!(store
            .delete_child_by_id(endpoint.id, "adapters", child_id)
            .await
            .is_ok());
        assert!(matches!(
            store.delete_child_by_id(endpoint.id, "adapters", child_id).await,
            Err(ControlPlaneError::NotFound { .. })
        ));
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(updated.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_child_key_is_invalid() {
        let store = endpoint_store(EventBus::new());
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };
        let result = store.list_child::<Binding>(endpoint.id, "handlers").await;
        assert!(matches!(result, Err(ControlPlaneError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn add_children_emits_single_event() {
        let bus = EventBus::new();
        let added = counter(&bus, "store.add.Endpoint.middleware");
        let store = endpoint_store(bus);
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };
        let Ok(parent) = store
            .add_children(endpoint.id, "middleware", &[binding_input(), binding_input()])
            .await
        else {
            panic!("add_children should succeed");
        };
        assert_eq!(parent.middleware.len(), 2);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reorder_requires_a_permutation() {
        let store = endpoint_store(EventBus::new());
        let Ok(endpoint) = store.create(&json!({"host": "a.example"})).await else {
            panic!("create should succeed");
        };
        let Ok(parent) = store
            .add_children(endpoint.id, "adapters", &[binding_input(), binding_input()])
            .await
        else {
            panic!("add_children should succeed");
        };
        let ids: Vec<DocumentId> = parent.adapters.iter().map(|b| b.id).collect();
        let (Some(&a), Some(&b)) = (ids.first(), ids.get(1)) else {
            panic!("two adapters expected");
        };

        let Ok(reordered) = store.reorder_children(endpoint.id, "adapters", &[b, a]).await else {
            panic!("reorder with a permutation should succeed");
        };
        let order: Vec<DocumentId> = reordered.adapters.iter().map(|b| b.id).collect();
        assert_eq!(order, vec![b, a]);

        let stranger = DocumentId::new();
        assert!(matches!(
            store.reorder_children(endpoint.id, "adapters", &[a, stranger]).await,
            Err(ControlPlaneError::Reorder(_))
        ));
        assert!(matches!(
            store.reorder_children(endpoint.id, "adapters", &[a, a]).await,
            Err(ControlPlaneError::Reorder(_))
        ));
        assert!(matches!(
            store.reorder_children(endpoint.id, "adapters", &[a]).await,
            Err(ControlPlaneError::Reorder(_))
        ));

        let Ok(unchanged) = store.by_id(endpoint.id).await else {
            panic!("endpoint should load");
        };
        let order: Vec<DocumentId> = unchanged.adapters.iter().map(|b| b.id).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_undo_the_write() {
        let bus = EventBus::new();
        bus.subscribe("store.create.Endpoint", |_| {
            Err(ControlPlaneError::Internal("listener down".into()))
        });
        let store = endpoint_store(bus);
        assert!(store.create(&json!({"host": "a.example"})).await.is_ok());
        assert!(matches!(store.list().await, Ok(list) if list.len() == 1));
    }
}
