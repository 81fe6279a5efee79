//! Relationship resolution along declared document paths.
//!
//! A relationship path such as `middleware.configuration` names a field
//! reached by walking objects and fanning out over arrays. Stored documents
//! hold bare ids at those leaves; [`resolve`] swaps them for the referenced
//! documents on read, and [`collapse`] turns embedded documents back into
//! ids before a write.

use std::collections::HashMap;

use serde_json::Value;

use super::options::Relationship;
use crate::domain::DocumentId;
use crate::error::ControlPlaneError;
use crate::persistence::DocumentBackend;

/// Calls `visit` on every leaf reached by `segments`.
fn visit_leaves(value: &mut Value, segments: &[&str], visit: &mut dyn FnMut(&mut Value)) {
    let Some((head, rest)) = segments.split_first() else {
        match value {
            Value::Array(items) => items.iter_mut().for_each(|item| visit(item)),
            leaf => visit(leaf),
        }
        return;
    };
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                visit_leaves(item, segments, visit);
            }
        }
        Value::Object(map) => {
            if let Some(child) = map.get_mut(*head) {
                visit_leaves(child, rest, visit);
            }
        }
        _ => {}
    }
}

/// Replaces referenced ids with the documents they point at.
///
/// References whose target no longer exists are left as ids and logged;
/// a dangling reference is not an error.
///
/// # Errors
///
/// Propagates backend failures.
pub async fn resolve(
    backend: &dyn DocumentBackend,
    relationships: &[Relationship],
    document: &mut Value,
) -> Result<(), ControlPlaneError> {
    for rel in relationships {
        let segments: Vec<&str> = rel.path.split('.').collect();

        let mut wanted: Vec<DocumentId> = Vec::new();
        visit_leaves(document, &segments, &mut |leaf: &mut Value| {
            if let Some(id) = leaf.as_str().and_then(|s| s.parse::<DocumentId>().ok())
                && !wanted.contains(&id)
            {
                wanted.push(id);
            }
        });
        if wanted.is_empty() {
            continue;
        }

        let mut found: HashMap<DocumentId, Value> = HashMap::with_capacity(wanted.len());
        for id in wanted {
            if let Some(target) = backend.get(rel.collection, id).await? {
                found.insert(id, target);
            }
        }

        visit_leaves(document, &segments, &mut |leaf: &mut Value| {
            let Some(id) = leaf.as_str().and_then(|s| s.parse::<DocumentId>().ok()) else {
                return;
            };
            match found.get(&id) {
                Some(target) => *leaf = target.clone(),
                None => tracing::warn!(
                    path = rel.path,
                    collection = rel.collection,
                    %id,
                    "dangling reference left unresolved"
                ),
            }
        });
    }
    Ok(())
}

/// Replaces embedded documents at relationship leaves with their ids.
pub fn collapse(relationships: &[Relationship], id_field: &str, document: &mut Value) {
    for rel in relationships {
        let segments: Vec<&str> = rel.path.split('.').collect();
        visit_leaves(document, &segments, &mut |leaf: &mut Value| {
            if let Some(id) = leaf.get(id_field).cloned() {
                *leaf = id;
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryBackend;
    use serde_json::json;

    fn rels() -> Vec<Relationship> {
        vec![
            Relationship {
                path: "middleware.configuration",
                collection: "configurations",
            },
            Relationship {
                path: "adapters.configuration",
                collection: "configurations",
            },
        ]
    }

    #[tokio::test]
    async fn resolves_references_inside_child_lists() {
        let backend = MemoryBackend::new();
        let cfg_id = DocumentId::new();
        let cfg = json!({"id": cfg_id, "module": "sample", "name": "s"});
        let _ = backend
            .insert("configurations", cfg_id, cfg.clone(), Vec::new())
            .await;

        let mut endpoint = json!({
            "host": "h",
            "middleware": [{"id": "b1", "configuration": cfg_id}],
            "adapters": [{"id": "b2", "configuration": cfg_id}],
        });
        let result = resolve(&backend, &rels(), &mut endpoint).await;
        assert!(result.is_ok());
        assert_eq!(endpoint["middleware"][0]["configuration"], cfg);
        assert_eq!(endpoint["adapters"][0]["configuration"], cfg);
    }

    #[tokio::test]
    async fn dangling_references_stay_ids() {
        let backend = MemoryBackend::new();
        let missing = DocumentId::new();
        let mut endpoint = json!({
            "middleware": [{"id": "b1", "configuration": missing}],
            "adapters": [],
        });
        let result = resolve(&backend, &rels(), &mut endpoint).await;
        assert!(result.is_ok());
        assert_eq!(
            endpoint["middleware"][0]["configuration"],
            json!(missing.to_string())
        );
    }

    #[test]
    fn collapse_restores_ids() {
        let cfg_id = DocumentId::new();
        let mut endpoint = json!({
            "middleware": [{"id": "b1", "configuration": {"id": cfg_id, "name": "s"}}],
            "adapters": [{"id": "b2", "configuration": cfg_id}],
        });
        collapse(&rels(), "id", &mut endpoint);
        assert_eq!(
            endpoint,
            json!({
                "middleware": [{"id": "b1", "configuration": cfg_id}],
                "adapters": [{"id": "b2", "configuration": cfg_id}],
            })
        );
    }
}
