//! Built stage instances and the handles pipelines hold onto them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::DocumentId;
use crate::error::ControlPlaneError;
use crate::pipeline::{RequestContext, Stage, StageOutcome};

type InstanceKey = (String, DocumentId);

/// Stage instances keyed by `(module canonical name, configuration id)`.
#[derive(Default)]
pub struct InstanceCache {
    instances: RwLock<HashMap<InstanceKey, Arc<dyn Stage>>>,
}

impl fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("len", &self.len())
            .finish()
    }
}

impl InstanceCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current instance for a configuration, if one is built.
    #[must_use]
    pub fn get(&self, module: &str, configuration: DocumentId) -> Option<Arc<dyn Stage>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(module.to_string(), configuration))
            .map(Arc::clone)
    }

    /// Stores or replaces an instance.
    pub fn insert(&self, module: &str, configuration: DocumentId, stage: Arc<dyn Stage>) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((module.to_string(), configuration), stage);
    }

    /// Drops every instance built for `configuration`, whatever module.
    pub fn evict(&self, configuration: DocumentId) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, id), _| *id != configuration);
    }

    /// Drops every instance.
    pub fn clear(&self) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable stage that forwards to whatever instance is cached for its
/// configuration at the time of each request.
///
/// Rebuilding or evicting the instance takes effect on the next request
/// without touching mounted pipelines.
#[derive(Debug, Clone)]
pub struct StageHandle {
    target: Option<(String, DocumentId)>,
    configuration: DocumentId,
    cache: Arc<InstanceCache>,
}

impl StageHandle {
    pub(crate) fn new(module: String, configuration: DocumentId, cache: Arc<InstanceCache>) -> Self {
        Self {
            target: Some((module, configuration)),
            configuration,
            cache,
        }
    }

    /// A handle for a reference that did not resolve; it fails on every
    /// request.
    pub(crate) fn dangling(configuration: DocumentId, cache: Arc<InstanceCache>) -> Self {
        Self {
            target: None,
            configuration,
            cache,
        }
    }

    /// The configuration this handle serves.
    #[must_use]
    pub fn configuration(&self) -> DocumentId {
        self.configuration
    }
}

impl Stage for StageHandle {
    fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
        let stage = self
            .target
            .as_ref()
            .and_then(|(module, id)| self.cache.get(module, *id))
            .ok_or_else(|| {
                ControlPlaneError::ConfigurationMismatch(format!(
                    "no module instance for configuration {}",
                    self.configuration
                ))
            })?;
        stage.handle(ctx)
    }
}
