//! The root dispatcher: routes requests to mounted endpoint tables by
//! namespace.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{DispatchTable, RequestContext, StageResponse};
use crate::error::ControlPlaneError;

/// Namespace → dispatch table map consulted by the serving fallback.
///
/// A namespace is the first path segment with its leading slash, e.g.
/// `/<endpointId>`.
#[derive(Debug, Default)]
pub struct RootDispatcher {
    tables: RwLock<HashMap<String, Arc<DispatchTable>>>,
}

impl RootDispatcher {
    /// Creates a dispatcher with nothing mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `table` under `namespace`, replacing any previous table.
    pub fn mount(&self, namespace: impl Into<String>, table: Arc<DispatchTable>) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace.into(), table);
    }

    /// Unmounts `namespace`. Returns `false` if nothing was mounted there.
    pub fn unmount(&self, namespace: &str) -> bool {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace)
            .is_some()
    }

    /// The table mounted under `namespace`.
    #[must_use]
    pub fn table(&self, namespace: &str) -> Option<Arc<DispatchTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map(Arc::clone)
    }

    /// Number of mounted namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits `ctx.path` into namespace and inner path, then dispatches
    /// through the mounted table with `ctx.path` rewritten to the inner
    /// path.
    ///
    /// # Errors
    ///
    /// [`ControlPlaneError::NotFound`] for an unknown namespace, otherwise
    /// whatever [`DispatchTable::dispatch`] returns.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> Result<StageResponse, ControlPlaneError> {
        let (namespace, inner) = split_namespace(&ctx.path);
        let Some(table) = self.table(&namespace) else {
            return Err(ControlPlaneError::not_found("namespace", namespace));
        };
        ctx.path = inner;
        table.dispatch(ctx)
    }
}

/// `/abc/def/g` → (`/abc`, `/def/g`); `/abc` → (`/abc`, `/`).
fn split_namespace(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((head, rest)) => (format!("/{head}"), format!("/{rest}")),
        None => (format!("/{trimmed}"), "/".to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::Method;

    use super::*;
    use crate::domain::{DocumentId, Verb};
    use crate::pipeline::{Stage, StageOutcome};

    #[derive(Debug)]
    struct Path;

    impl Stage for Path {
        fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError> {
            Ok(StageOutcome::Respond(StageResponse::text(ctx.path.clone())))
        }
    }

    #[test]
    fn split_namespace_handles_bare_namespace() {
        assert_eq!(
            split_namespace("/abc/def/g"),
            (String::from("/abc"), String::from("/def/g"))
        );
        assert_eq!(
            split_namespace("/abc"),
            (String::from("/abc"), String::from("/"))
        );
    }

    #[test]
    fn dispatch_strips_namespace() {
        let root = RootDispatcher::new();
        let id = DocumentId::new();
        let mut table = DispatchTable::new(id);
        table.push(DocumentId::new(), Verb::All, "*", Arc::new(Path));
        root.mount(format!("/{id}"), Arc::new(table));

        let mut ctx = RequestContext::new(Method::GET, format!("/{id}/inner/path"));
        let Ok(response) = root.dispatch(&mut ctx) else {
            panic!("mounted namespace should dispatch");
        };
        assert_eq!(response, StageResponse::text("/inner/path"));

        assert!(root.unmount(&format!("/{id}")));
        assert!(!root.unmount(&format!("/{id}")));
        let mut ctx = RequestContext::new(Method::GET, format!("/{id}/inner"));
        assert!(matches!(
            root.dispatch(&mut ctx),
            Err(ControlPlaneError::NotFound { .. })
        ));
    }
}
