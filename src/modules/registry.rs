//! Module catalog, configuration binding and the stage instance cache.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use super::discovery::{ModuleDescriptor, UnitTree, discover};
use super::instance::{InstanceCache, StageHandle};
use crate::domain::{Configuration, DocumentId, EventBus, Operation, Reference, event_name};
use crate::error::ControlPlaneError;
use crate::store::{DocumentStore, DocumentValidator};

#[derive(Debug, Default)]
struct Catalog {
    order: Vec<String>,
    modules: HashMap<String, ModuleDescriptor>,
}

/// Registry of processing modules.
///
/// Owns the catalog of discovered modules (each with the configurations
/// bound to it) and the cache of stage instances built from those
/// configurations. Both are kept current by subscribing to configuration
/// events; see [`ModuleRegistry::subscribe`].
#[derive(Debug)]
pub struct ModuleRegistry {
    catalog: RwLock<Catalog>,
    instances: Arc<InstanceCache>,
}

impl ModuleRegistry {
    /// Discovers the modules in `tree`.
    #[must_use]
    pub fn new(tree: &UnitTree) -> Self {
        let mut catalog = Catalog::default();
        for descriptor in discover(tree) {
            catalog.order.push(descriptor.canonical_name.clone());
            catalog
                .modules
                .insert(descriptor.canonical_name.clone(), descriptor);
        }
        Self {
            catalog: RwLock::new(catalog),
            instances: Arc::new(InstanceCache::new()),
        }
    }

    /// Looks up a module by canonical name.
    #[must_use]
    pub fn module(&self, canonical_name: &str) -> Option<ModuleDescriptor> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modules
            .get(canonical_name)
            .cloned()
    }

    /// All modules in discovery order.
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleDescriptor> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog
            .order
            .iter()
            .filter_map(|name| catalog.modules.get(name).cloned())
            .collect()
    }

    /// The configuration bound to `canonical_name` with id `configuration`.
    #[must_use]
    pub fn module_configuration(
        &self,
        canonical_name: &str,
        configuration: DocumentId,
    ) -> Option<Configuration> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modules
            .get(canonical_name)
            .and_then(|module| {
                module
                    .configurations
                    .iter()
                    .find(|cfg| cfg.id == configuration)
                    .cloned()
            })
    }

    /// The instance cache shared with every handle this registry hands out.
    #[must_use]
    pub fn instances(&self) -> &Arc<InstanceCache> {
        &self.instances
    }

    /// Binds a configuration to its module and (re)builds its instance.
    ///
    /// A configuration naming an unknown module is logged and ignored. A
    /// factory error or panic is logged and leaves no instance.
    pub fn bind(&self, configuration: &Configuration) {
        self.unbind(configuration.id);

        let plugin = {
            let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
            let Some(module) = catalog.modules.get_mut(&configuration.module) else {
                tracing::warn!(
                    module = %configuration.module,
                    configuration = %configuration.name,
                    "no module for configuration, the module was likely removed"
                );
                return;
            };
            module.configurations.push(configuration.clone());
            Arc::clone(module.plugin())
        };

        let built = catch_unwind(AssertUnwindSafe(|| plugin.build(&configuration.parameters)));
        match built {
            Ok(Ok(stage)) => {
                self.instances
                    .insert(&configuration.module, configuration.id, stage);
                tracing::debug!(
                    module = %configuration.module,
                    configuration = %configuration.id,
                    "module instance built"
                );
            }
            Ok(Err(err)) => {
                tracing::error!(
                    module = %configuration.module,
                    configuration = %configuration.id,
                    error = %err,
                    "cannot build module instance"
                );
            }
            Err(_) => {
                tracing::error!(
                    module = %configuration.module,
                    configuration = %configuration.id,
                    "module panicked while building its instance"
                );
            }
        }
    }

    /// Unbinds a configuration from whichever module holds it and evicts
    /// its instance.
    pub fn unbind(&self, configuration: DocumentId) {
        {
            let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
            for module in catalog.modules.values_mut() {
                module.configurations.retain(|cfg| cfg.id != configuration);
            }
        }
        self.instances.evict(configuration);
    }

    /// Binds every persisted configuration. Failure to list is logged, not
    /// returned.
    pub async fn load_configurations(&self, store: &DocumentStore<Configuration>) {
        match store.list().await {
            Ok(configurations) => {
                for configuration in &configurations {
                    self.bind(configuration);
                }
                tracing::info!(
                    configurations = configurations.len(),
                    instances = self.instances.len(),
                    "configurations loaded"
                );
            }
            Err(err) => tracing::error!(error = %err, "cannot load configurations"),
        }
    }

    /// Keeps the catalog and instance cache in step with configuration
    /// create, update and delete events.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        for op in [Operation::Create, Operation::Update] {
            let registry = Arc::clone(self);
            bus.subscribe(event_name(op, "Configuration", None), move |event| {
                if let Some(cfg) = event.entity().as_configuration() {
                    registry.bind(cfg);
                }
                Ok(())
            });
        }
        let registry = Arc::clone(self);
        bus.subscribe(
            event_name(Operation::Delete, "Configuration", None),
            move |event| {
                if let Some(cfg) = event.entity().as_configuration() {
                    registry.unbind(cfg.id);
                }
                Ok(())
            },
        );
    }

    /// A handle that invokes the current instance for `configuration`.
    ///
    /// An unresolved reference yields a handle that fails on every request.
    #[must_use]
    pub fn instance_for(&self, configuration: &Reference<Configuration>) -> StageHandle {
        match configuration.resolved() {
            Some(cfg) => {
                if self.instances.get(&cfg.module, cfg.id).is_none() {
                    tracing::warn!(
                        module = %cfg.module,
                        configuration = %cfg.id,
                        "no module instance for configuration yet"
                    );
                }
                StageHandle::new(cfg.module.clone(), cfg.id, Arc::clone(&self.instances))
            }
            None => {
                tracing::warn!(
                    configuration = %configuration.id(),
                    "binding references a missing configuration"
                );
                StageHandle::dangling(configuration.id(), Arc::clone(&self.instances))
            }
        }
    }

    /// Evicts every instance and unbinds every configuration.
    pub fn shutdown(&self) {
        self.instances.clear();
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        for module in catalog.modules.values_mut() {
            module.configurations.clear();
        }
        tracing::info!("module registry shut down");
    }
}

impl DocumentValidator<Configuration> for ModuleRegistry {
    fn validate(&self, configuration: &Configuration) -> Result<(), ControlPlaneError> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        let module = catalog.modules.get(&configuration.module).ok_or_else(|| {
            ControlPlaneError::ConfigurationMismatch(format!(
                "no module named {}",
                configuration.module
            ))
        })?;
        module.schema.validate(&configuration.parameters).map_err(|err| match err {
            ControlPlaneError::Validation(msg) => ControlPlaneError::Validation(format!(
                "invalid parameters for module {}: {msg}",
                configuration.module
            )),
            other => other,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::modules::{Plugin, builtin};
    use crate::pipeline::{RequestContext, Stage, StageOutcome, StageResponse};

    #[derive(Debug)]
    struct Exploding;

    impl Plugin for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn parameter_schema(&self) -> serde_json::Value {
            json!({"properties": {}})
        }

        fn build(&self, _parameters: &serde_json::Value) -> Result<Arc<dyn Stage>, ControlPlaneError> {
            panic!("build blew up");
        }
    }

    fn registry() -> Arc<ModuleRegistry> {
        Arc::new(ModuleRegistry::new(&builtin::units()))
    }

    fn sample_configuration(repeat: u64) -> Configuration {
        Configuration {
            id: DocumentId::new(),
            module: "sample".into(),
            name: "twice".into(),
            parameters: json!({"echo": "ab", "repeat": repeat}),
            description: None,
        }
    }

    #[test]
    fn validator_distinguishes_unknown_module_from_bad_parameters() {
        let registry = registry();
        let mut cfg = sample_configuration(0);
        assert!(matches!(
            registry.validate(&cfg),
            Err(ControlPlaneError::Validation(_))
        ));
        cfg.module = "missing".into();
        assert!(matches!(
            registry.validate(&cfg),
            Err(ControlPlaneError::ConfigurationMismatch(_))
        ));
        assert!(registry.validate(&sample_configuration(2)).is_ok());
    }

    #[test]
    fn bound_configuration_produces_working_handle() {
        let registry = registry();
        let cfg = sample_configuration(3);
        registry.bind(&cfg);
        assert_eq!(
            registry.module("sample").map(|m| m.configurations.len()),
            Some(1)
        );

        let handle = registry.instance_for(&Reference::Resolved(Box::new(cfg.clone())));
        let mut ctx = RequestContext::new(Method::GET, "/");
        let Ok(StageOutcome::Respond(response)) = handle.handle(&mut ctx) else {
            panic!("sample should respond");
        };
        assert_eq!(response, StageResponse::text("ababab"));

        registry.unbind(cfg.id);
        assert!(matches!(
            handle.handle(&mut ctx),
            Err(ControlPlaneError::ConfigurationMismatch(_))
        ));
        assert!(registry.module_configuration("sample", cfg.id).is_none());
    }

    #[test]
    fn unknown_module_is_not_bound() {
        let registry = registry();
        let mut cfg = sample_configuration(1);
        cfg.module = "gone".into();
        registry.bind(&cfg);
        assert!(registry.instances().is_empty());
    }

    #[test]
    fn dangling_reference_yields_failing_handle() {
        let registry = registry();
        let handle = registry.instance_for(&Reference::Id(DocumentId::new()));
        let mut ctx = RequestContext::new(Method::GET, "/");
        assert!(handle.handle(&mut ctx).is_err());
    }

    #[test]
    fn modules_are_listed_in_discovery_order() {
        let names: Vec<String> = registry()
            .modules()
            .into_iter()
            .map(|m| m.canonical_name)
            .collect();
        assert_eq!(names, ["audit", "sample", "adapters.echo"]);
    }

    #[test]
    fn shutdown_evicts_everything() {
        let registry = registry();
        registry.bind(&sample_configuration(1));
        registry.shutdown();
        assert!(registry.instances().is_empty());
        assert_eq!(
            registry.module("sample").map(|m| m.configurations.len()),
            Some(0)
        );
    }

    #[test]
    fn panicking_build_is_isolated() {
        let registry = ModuleRegistry::new(
            &builtin::units().unit(Arc::new(Exploding)),
        );
        let boom = Configuration {
            id: DocumentId::new(),
            module: "exploding".into(),
            name: "boom".into(),
            parameters: json!({}),
            description: None,
        };
        registry.bind(&boom);
        assert!(registry.instances().is_empty());
        assert!(registry.module_configuration("exploding", boom.id).is_some());

        registry.bind(&sample_configuration(2));
        assert_eq!(registry.instances().len(), 1);
    }

    #[test]
    fn oversized_sample_is_rejected_by_schema_and_build() {
        let registry = registry();
        let mut cfg = sample_configuration(1);
        cfg.parameters = json!({"echo": "ab", "repeat": 1e19});
        assert!(matches!(
            registry.validate(&cfg),
            Err(ControlPlaneError::Validation(_))
        ));
        registry.bind(&cfg);
        assert!(registry.instances().is_empty());
    }
}
