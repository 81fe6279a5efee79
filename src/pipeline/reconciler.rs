//! Keeps mounted dispatch tables in step with stored endpoints.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{DispatchTable, RootDispatcher};
use crate::domain::{DocumentId, Endpoint, EventBus, Operation, PipelineKey, event_name};
use crate::error::ControlPlaneError;
use crate::modules::ModuleRegistry;
use crate::store::DocumentStore;

/// Builds, mounts and unmounts one dispatch table per endpoint.
///
/// Each endpoint is either unattached or attached. Creation attaches, any
/// change to the endpoint or its bindings reattaches, deletion detaches.
/// Reattaching is not atomic with respect to traffic: a request that lands
/// between detach and attach sees an unknown namespace.
#[derive(Debug)]
pub struct PipelineReconciler {
    registry: Arc<ModuleRegistry>,
    root: Arc<RootDispatcher>,
    attached: RwLock<HashMap<DocumentId, Arc<DispatchTable>>>,
}

impl PipelineReconciler {
    /// Creates a reconciler mounting into `root`.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>, root: Arc<RootDispatcher>) -> Self {
        Self {
            registry,
            root,
            attached: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the endpoint's table (middleware then adapters, each in list
    /// order) and mounts it under the endpoint namespace.
    pub fn attach(&self, endpoint: &Endpoint) -> Arc<DispatchTable> {
        let mut table = DispatchTable::new(endpoint.id);
        for binding in endpoint.stages() {
            let handle = self.registry.instance_for(&binding.configuration);
            table.push(binding.id, binding.verb, &binding.path, Arc::new(handle));
        }
        let table = Arc::new(table);

        self.root.mount(endpoint.namespace(), Arc::clone(&table));
        self.attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.id, Arc::clone(&table));
        tracing::info!(
            endpoint = %endpoint.id,
            host = %endpoint.host,
            stages = table.stages().len(),
            "pipeline attached"
        );
        table
    }

    /// Unmounts the endpoint's table. Returns `false` if it was not
    /// attached.
    pub fn detach(&self, endpoint: DocumentId) -> bool {
        let was_attached = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&endpoint)
            .is_some();
        let was_mounted = self.root.unmount(&format!("/{endpoint}"));
        if was_attached || was_mounted {
            tracing::info!(%endpoint, "pipeline detached");
        }
        was_attached
    }

    /// Detaches then reattaches `endpoint`.
    pub fn reconcile(&self, endpoint: &Endpoint) -> Arc<DispatchTable> {
        self.detach(endpoint.id);
        self.attach(endpoint)
    }

    /// The table currently attached for `endpoint`.
    #[must_use]
    pub fn table(&self, endpoint: DocumentId) -> Option<Arc<DispatchTable>> {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint)
            .map(Arc::clone)
    }

    /// Number of attached endpoints.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Attaches every stored endpoint, in listing order.
    ///
    /// # Errors
    ///
    /// Returns the store error if endpoints cannot be listed.
    pub async fn start(&self, store: &DocumentStore<Endpoint>) -> Result<usize, ControlPlaneError> {
        let endpoints = store.list().await?;
        for endpoint in &endpoints {
            self.attach(endpoint);
        }
        tracing::info!(endpoints = endpoints.len(), "pipelines started");
        Ok(endpoints.len())
    }

    /// Subscribes to endpoint lifecycle and binding events.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let reconciler = Arc::clone(self);
        bus.subscribe(
            event_name(Operation::Create, "Endpoint", None),
            move |event| {
                if let Some(endpoint) = event.entity().as_endpoint() {
                    reconciler.attach(endpoint);
                }
                Ok(())
            },
        );

        let reconciler = Arc::clone(self);
        bus.subscribe(
            event_name(Operation::Delete, "Endpoint", None),
            move |event| {
                if let Some(endpoint) = event.entity().as_endpoint() {
                    reconciler.detach(endpoint.id);
                }
                Ok(())
            },
        );

        let mut names = vec![event_name(Operation::Update, "Endpoint", None)];
        for key in PipelineKey::BOTH {
            for op in [
                Operation::Add,
                Operation::Delete,
                Operation::Update,
                Operation::Reorder,
            ] {
                names.push(event_name(op, "Endpoint", Some(key.as_str())));
            }
        }
        for name in names {
            let reconciler = Arc::clone(self);
            bus.subscribe(name, move |event| {
                if let Some(endpoint) = event.entity().as_endpoint() {
                    reconciler.reconcile(endpoint);
                }
                Ok(())
            });
        }
    }

    /// Detaches every endpoint.
    pub fn shutdown(&self) {
        let ids: Vec<DocumentId> = self
            .attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for id in ids {
            self.detach(id);
        }
        tracing::info!("pipelines shut down");
    }
}
