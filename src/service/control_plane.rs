//! Control plane: wires the stores, the module registry and the pipeline
//! reconciler together around one event bus.

use std::sync::Arc;

use serde_json::Value;

use super::BindingFactory;
use crate::domain::{Configuration, DocumentId, Endpoint, EventBus, PipelineKey};
use crate::error::ControlPlaneError;
use crate::modules::{ModuleDescriptor, ModuleRegistry, UnitTree};
use crate::persistence::DocumentBackend;
use crate::pipeline::{PipelineReconciler, RootDispatcher};
use crate::store::{
    CONFIGURATIONS, ChildFactory, DocumentStore, DocumentValidator, ENDPOINTS, KeyMap,
    StoreOptions,
};

/// The assembled control plane.
///
/// Construction order matters: the registry subscribes to configuration
/// events and loads stored configurations before the reconciler attaches
/// stored endpoints, so every mounted stage finds its instance.
#[derive(Debug)]
pub struct ControlPlane {
    bus: EventBus,
    configurations: DocumentStore<Configuration>,
    endpoints: DocumentStore<Endpoint>,
    registry: Arc<ModuleRegistry>,
    root: Arc<RootDispatcher>,
    reconciler: Arc<PipelineReconciler>,
}

impl ControlPlane {
    /// Boots the control plane over `backend` with the modules in `units`.
    ///
    /// # Errors
    ///
    /// Returns the store error if stored endpoints cannot be listed; the
    /// process cannot serve without them.
    pub async fn bootstrap(
        backend: Arc<dyn DocumentBackend>,
        units: &UnitTree,
    ) -> Result<Self, ControlPlaneError> {
        let bus = EventBus::new();

        let registry = Arc::new(ModuleRegistry::new(units));
        let shared: Arc<ModuleRegistry> = Arc::clone(&registry);
        let validator: Arc<dyn DocumentValidator<Configuration>> = shared;
        let configurations = DocumentStore::new(
            Arc::clone(&backend),
            bus.clone(),
            StoreOptions::new("Configuration", CONFIGURATIONS)
                .key_map(
                    KeyMap::new()
                        .copy("name")
                        .copy("module")
                        .copy("parameters")
                        .copy("description"),
                )
                .mutable("parameters")
                .validator(validator),
        );
        registry.subscribe(&bus);
        registry.load_configurations(&configurations).await;

        let bindings: Arc<dyn ChildFactory> =
            Arc::new(BindingFactory::new(configurations.clone()));
        let endpoints = DocumentStore::new(
            backend,
            bus.clone(),
            StoreOptions::new("Endpoint", ENDPOINTS)
                .key_map(
                    KeyMap::new()
                        .copy("host")
                        .copy("name")
                        .copy("region")
                        .copy("description"),
                )
                .child(PipelineKey::Middleware.as_str(), Arc::clone(&bindings))
                .child(PipelineKey::Adapters.as_str(), bindings)
                .populate("middleware.configuration", CONFIGURATIONS)
                .populate("adapters.configuration", CONFIGURATIONS)
                .unique("host"),
        );

        let root = Arc::new(RootDispatcher::new());
        let reconciler = Arc::new(PipelineReconciler::new(
            Arc::clone(&registry),
            Arc::clone(&root),
        ));
        reconciler.subscribe(&bus);
        reconciler.start(&endpoints).await?;

        Ok(Self {
            bus,
            configurations,
            endpoints,
            registry,
            root,
            reconciler,
        })
    }

    /// The shared event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The configuration store.
    #[must_use]
    pub fn configurations(&self) -> &DocumentStore<Configuration> {
        &self.configurations
    }

    /// The endpoint store.
    #[must_use]
    pub fn endpoints(&self) -> &DocumentStore<Endpoint> {
        &self.endpoints
    }

    /// The module registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// The root dispatcher serving traffic.
    #[must_use]
    pub fn root(&self) -> &Arc<RootDispatcher> {
        &self.root
    }

    /// The pipeline reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &Arc<PipelineReconciler> {
        &self.reconciler
    }

    /// Looks up a module.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] for an unknown canonical name.
    pub fn module(&self, canonical_name: &str) -> Result<ModuleDescriptor, ControlPlaneError> {
        self.registry
            .module(canonical_name)
            .ok_or_else(|| ControlPlaneError::not_found("module", canonical_name))
    }

    /// Configurations bound to a module.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] for an unknown module.
    pub fn module_configurations(
        &self,
        canonical_name: &str,
    ) -> Result<Vec<Configuration>, ControlPlaneError> {
        Ok(self.module(canonical_name)?.configurations)
    }

    /// One configuration of a module.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] if the module is unknown or the
    /// configuration does not belong to it.
    pub fn module_configuration(
        &self,
        canonical_name: &str,
        configuration: DocumentId,
    ) -> Result<Configuration, ControlPlaneError> {
        self.module(canonical_name)?;
        self.registry
            .module_configuration(canonical_name, configuration)
            .ok_or_else(|| ControlPlaneError::not_found("configuration", configuration))
    }

    /// Creates a configuration for a module; the module in the path wins
    /// over any `module` field in `input`.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] for an unknown module, otherwise as
    /// for [`DocumentStore::create`].
    pub async fn create_module_configuration(
        &self,
        canonical_name: &str,
        input: &Value,
    ) -> Result<Configuration, ControlPlaneError> {
        self.module(canonical_name)?;
        let mut input = input.clone();
        let Some(obj) = input.as_object_mut() else {
            return Err(ControlPlaneError::InvalidRequest(
                "configuration must be a JSON object".into(),
            ));
        };
        obj.insert("module".into(), Value::String(canonical_name.to_string()));
        self.configurations.create(&input).await
    }

    /// Updates a configuration of a module.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] as for
    /// [`ControlPlane::module_configuration`],
    /// [`ControlPlaneError::ConfigurationMismatch`] if `delta` names another
    /// module, otherwise as for [`DocumentStore::update`].
    pub async fn update_module_configuration(
        &self,
        canonical_name: &str,
        configuration: DocumentId,
        delta: &Value,
    ) -> Result<Configuration, ControlPlaneError> {
        self.module_configuration(canonical_name, configuration)?;
        if let Some(module) = delta.get("module").and_then(Value::as_str)
            && module != canonical_name
        {
            return Err(ControlPlaneError::ConfigurationMismatch(format!(
                "configuration module {module} does not match module {canonical_name}"
            )));
        }
        self.configurations.update(configuration, delta).await
    }

    /// Deletes a configuration of a module.
    ///
    /// # Errors
    ///
    /// As for [`ControlPlane::module_configuration`] and
    /// [`DocumentStore::remove`].
    pub async fn delete_module_configuration(
        &self,
        canonical_name: &str,
        configuration: DocumentId,
    ) -> Result<Configuration, ControlPlaneError> {
        self.module_configuration(canonical_name, configuration)?;
        self.configurations.remove(configuration).await
    }

    /// Detaches every pipeline and evicts every module instance.
    pub fn shutdown(&self) {
        self.reconciler.shutdown();
        self.registry.shutdown();
        tracing::info!("control plane shut down");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::domain::Reference;
    use crate::modules::builtin;
    use crate::persistence::MemoryBackend;
    use crate::pipeline::{RequestContext, Stage, StageOutcome, StageResponse};
    use crate::store::CONFIGURATIONS;

    async fn boot() -> ControlPlane {
        let Ok(plane) =
            ControlPlane::bootstrap(Arc::new(MemoryBackend::new()), &builtin::units()).await
        else {
            panic!("bootstrap over an empty backend should succeed");
        };
        plane
    }

    fn get(plane: &ControlPlane, path: String) -> Result<StageResponse, ControlPlaneError> {
        let mut ctx = RequestContext::new(Method::GET, path);
        plane.root().dispatch(&mut ctx)
    }

    #[tokio::test]
    async fn schema_violation_creates_nothing() {
        let plane = boot().await;
        let result = plane
            .configurations()
            .create(&json!({"module": "sample", "name": "s", "parameters": {"echo": "ab", "repeat": 0}}))
            .await;
        assert!(matches!(result, Err(ControlPlaneError::Validation(_))));
        assert!(matches!(plane.configurations().list().await, Ok(l) if l.is_empty()));
    }

    #[tokio::test]
    async fn parameter_update_is_validated_before_persistence() {
        let plane = boot().await;
        let Ok(cfg) = plane
            .configurations()
            .create(&json!({"module": "sample", "name": "s", "parameters": {"echo": "ab", "repeat": 3}}))
            .await
        else {
            panic!("configuration should be created");
        };
        let handle = plane
            .registry()
            .instance_for(&Reference::Resolved(Box::new(cfg.clone())));

        let result = plane
            .configurations()
            .update(cfg.id, &json!({"parameters": {"repeat": 0}}))
            .await;
        assert!(matches!(result, Err(ControlPlaneError::Validation(_))));

        let Ok(stored) = plane.configurations().by_id(cfg.id).await else {
            panic!("configuration should still load");
        };
        assert_eq!(stored.parameters, json!({"echo": "ab", "repeat": 3}));
        let mut ctx = RequestContext::new(Method::GET, "/");
        assert!(matches!(
            handle.handle(&mut ctx),
            Ok(StageOutcome::Respond(response)) if response == StageResponse::text("ababab")
        ));
    }

    #[tokio::test]
    async fn host_update_to_a_taken_host_conflicts() {
        let plane = boot().await;
        let (Ok(first), Ok(second)) = (
            plane.endpoints().create(&json!({"host": "one.example"})).await,
            plane.endpoints().create(&json!({"host": "two.example"})).await,
        ) else {
            panic!("endpoints should be created");
        };

        let result = plane
            .endpoints()
            .update(second.id, &json!({"host": "one.example"}))
            .await;
        assert!(matches!(result, Err(ControlPlaneError::Conflict(_))));

        assert!(matches!(
            plane.endpoints().by_id(first.id).await,
            Ok(e) if e.host == "one.example"
        ));
        assert!(matches!(
            plane.endpoints().by_id(second.id).await,
            Ok(e) if e.host == "two.example"
        ));
    }

    #[tokio::test]
    async fn oversized_repeat_never_blocks_boot() {
        let plane = boot().await;
        let result = plane
            .configurations()
            .create(&json!({"module": "sample", "name": "big", "parameters": {"echo": "ab", "repeat": 1e19}}))
            .await;
        assert!(matches!(result, Err(ControlPlaneError::Validation(_))));

        // A record stored before the bound existed.
        let backend = Arc::new(MemoryBackend::new());
        let id = DocumentId::new();
        let stored = backend
            .insert(
                CONFIGURATIONS,
                id,
                json!({"id": id, "module": "sample", "name": "big", "parameters": {"echo": "ab", "repeat": 1e19}}),
                Vec::new(),
            )
            .await;
        assert!(stored.is_ok());

        let shared: Arc<dyn DocumentBackend> = backend;
        let Ok(restarted) = ControlPlane::bootstrap(shared, &builtin::units()).await else {
            panic!("bootstrap should survive an unbuildable configuration");
        };
        assert!(restarted.registry().instances().is_empty());
        assert!(restarted.registry().module_configuration("sample", id).is_some());
    }

    #[tokio::test]
    async fn unknown_module_is_a_mismatch() {
        let plane = boot().await;
        let result = plane
            .configurations()
            .create(&json!({"module": "nope", "name": "n"}))
            .await;
        assert!(matches!(
            result,
            Err(ControlPlaneError::ConfigurationMismatch(_))
        ));
    }

    #[tokio::test]
    async fn bound_sample_serves_then_fails_after_configuration_delete() {
        let plane = boot().await;
        let Ok(cfg) = plane
            .configurations()
            .create(&json!({"module": "sample", "name": "s", "parameters": {"echo": "ab", "repeat": 3}}))
            .await
        else {
            panic!("configuration should be created");
        };
        let Ok(endpoint) = plane.endpoints().create(&json!({"host": "a.example"})).await else {
            panic!("endpoint should be created");
        };
        let Ok(change) = plane
            .endpoints()
            .create_child(
                endpoint.id,
                "adapters",
                &json!({"verb": "get", "path": "/", "configuration": cfg.id}),
            )
            .await
        else {
            panic!("binding should be added");
        };
        assert_eq!(
            change.parent.adapters.first().and_then(|b| b.configuration.resolved()).map(|c| c.id),
            Some(cfg.id)
        );

        assert_eq!(
            get(&plane, format!("/{}/", endpoint.id)).ok(),
            Some(StageResponse::text("ababab"))
        );

        assert!(plane.configurations().remove(cfg.id).await.is_ok());
        let Err(ControlPlaneError::StageFailure { message, .. }) =
            get(&plane, format!("/{}/", endpoint.id))
        else {
            panic!("deleted configuration should fail the stage");
        };
        assert!(message.contains("configuration mismatch"));

        // The endpoint still lists the binding with a dangling id.
        let Ok(reloaded) = plane.endpoints().by_id(endpoint.id).await else {
            panic!("endpoint should still load");
        };
        assert!(matches!(
            reloaded.adapters.first().map(|b| &b.configuration),
            Some(crate::domain::Reference::Id(id)) if *id == cfg.id
        ));
    }

    #[tokio::test]
    async fn configuration_update_rebuilds_instance() {
        let plane = boot().await;
        let Ok(cfg) = plane
            .create_module_configuration("sample", &json!({"name": "s", "parameters": {"echo": "x", "repeat": 1}}))
            .await
        else {
            panic!("configuration should be created");
        };
        let Ok(endpoint) = plane.endpoints().create(&json!({"host": "b.example"})).await else {
            panic!("endpoint should be created");
        };
        let _ = plane
            .endpoints()
            .create_child(endpoint.id, "middleware", &json!({"verb": "all", "path": "*", "configuration": cfg.id}))
            .await;

        let updated = plane
            .update_module_configuration("sample", cfg.id, &json!({"parameters": {"repeat": 2}}))
            .await;
        assert!(updated.is_ok());
        assert_eq!(
            get(&plane, format!("/{}/any/path", endpoint.id)).ok(),
            Some(StageResponse::text("xx"))
        );
    }

    #[tokio::test]
    async fn module_scoped_operations_check_ownership() {
        let plane = boot().await;
        let Ok(cfg) = plane
            .create_module_configuration("audit", &json!({"name": "a", "module": "sample", "parameters": {"echo": "t"}}))
            .await
        else {
            panic!("configuration should be created");
        };
        assert_eq!(cfg.module, "audit");
        assert!(matches!(plane.module_configurations("audit"), Ok(l) if l.len() == 1));
        assert!(matches!(
            plane.module_configuration("sample", cfg.id),
            Err(ControlPlaneError::NotFound { .. })
        ));
        assert!(matches!(
            plane.module_configurations("missing"),
            Err(ControlPlaneError::NotFound { .. })
        ));
        assert!(matches!(
            plane
                .update_module_configuration("audit", cfg.id, &json!({"module": "sample"}))
                .await,
            Err(ControlPlaneError::ConfigurationMismatch(_))
        ));
        assert!(plane.delete_module_configuration("audit", cfg.id).await.is_ok());
        assert!(matches!(plane.module_configurations("audit"), Ok(l) if l.is_empty()));
    }

    #[tokio::test]
    async fn endpoint_delete_unmounts_pipeline() {
        let plane = boot().await;
        let Ok(endpoint) = plane.endpoints().create(&json!({"host": "c.example"})).await else {
            panic!("endpoint should be created");
        };
        assert!(plane.reconciler().table(endpoint.id).is_some());
        assert!(plane.endpoints().remove(endpoint.id).await.is_ok());
        assert!(plane.reconciler().table(endpoint.id).is_none());
        assert!(matches!(
            get(&plane, format!("/{}/", endpoint.id)),
            Err(ControlPlaneError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn restart_reattaches_stored_endpoints() {
        let backend: Arc<dyn DocumentBackend> = Arc::new(MemoryBackend::new());
        let Ok(first) = ControlPlane::bootstrap(Arc::clone(&backend), &builtin::units()).await else {
            panic!("bootstrap should succeed");
        };
        let Ok(cfg) = first
            .configurations()
            .create(&json!({"module": "sample", "name": "s", "parameters": {"echo": "z", "repeat": 2}}))
            .await
        else {
            panic!("configuration should be created");
        };
        let Ok(endpoint) = first.endpoints().create(&json!({"host": "d.example"})).await else {
            panic!("endpoint should be created");
        };
        let _ = first
            .endpoints()
            .create_child(endpoint.id, "adapters", &json!({"verb": "get", "configuration": cfg.id}))
            .await;
        first.shutdown();

        let Ok(second) = ControlPlane::bootstrap(backend, &builtin::units()).await else {
            panic!("second bootstrap should succeed");
        };
        assert_eq!(
            get(&second, format!("/{}", endpoint.id)).ok(),
            Some(StageResponse::text("zz"))
        );
    }
}
