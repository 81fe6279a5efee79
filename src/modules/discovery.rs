//! Boot-time discovery of processing modules.
//!
//! Modules are supplied as a [`UnitTree`]: packages holding units and
//! nested packages. Discovery walks the tree once, depth first, and turns
//! every conforming unit into a [`ModuleDescriptor`] whose canonical name is
//! the dot-joined package path followed by the unit's short name.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::{ParameterSchema, Plugin};
use crate::domain::Configuration;

/// Version reported for units that declare none.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// A node of the unit tree.
#[derive(Debug, Clone)]
pub enum UnitNode {
    /// A named package of further nodes.
    Package {
        /// Package segment; becomes part of the canonical name prefix.
        name: String,
        /// Units and nested packages.
        children: Vec<UnitNode>,
    },
    /// A processing module.
    Unit(Arc<dyn Plugin>),
}

/// The set of modules available to the registry.
#[derive(Debug, Clone, Default)]
pub struct UnitTree {
    nodes: Vec<UnitNode>,
}

impl UnitTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit at this level.
    #[must_use]
    pub fn unit(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.nodes.push(UnitNode::Unit(plugin));
        self
    }

    /// Adds a nested package.
    #[must_use]
    pub fn package(mut self, name: impl Into<String>, tree: UnitTree) -> Self {
        self.nodes.push(UnitNode::Package {
            name: name.into(),
            children: tree.nodes,
        });
        self
    }

    /// Top-level nodes.
    #[must_use]
    pub fn nodes(&self) -> &[UnitNode] {
        &self.nodes
    }
}

/// A discovered module and the configurations currently bound to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Package path plus short name, e.g. `adapters.echo`.
    pub canonical_name: String,
    /// Short name.
    pub name: String,
    /// Dot-joined package path; empty for top-level units.
    pub package: String,
    /// Declared or default version.
    pub version: String,
    /// Declared or default description.
    pub description: String,
    /// Parameter schema.
    #[serde(rename = "configurationSchema")]
    pub schema: ParameterSchema,
    /// Configurations bound to this module.
    pub configurations: Vec<Configuration>,
    #[serde(skip)]
    pub(crate) plugin: Arc<dyn Plugin>,
}

impl ModuleDescriptor {
    /// The module implementation.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

/// Walks `tree` and returns descriptors in discovery order.
///
/// Non-conforming units are logged and skipped without affecting siblings.
#[must_use]
pub fn discover(tree: &UnitTree) -> Vec<ModuleDescriptor> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    walk(&tree.nodes, &mut Vec::new(), &mut seen, &mut found);
    tracing::info!(count = found.len(), "processing modules discovered");
    found
}

fn walk(
    nodes: &[UnitNode],
    packages: &mut Vec<String>,
    seen: &mut HashSet<String>,
    found: &mut Vec<ModuleDescriptor>,
) {
    for node in nodes {
        match node {
            UnitNode::Package { name, children } => {
                if name.is_empty() || name.contains('.') {
                    tracing::error!(package = %name, "invalid package name, skipping package");
                    continue;
                }
                packages.push(name.clone());
                walk(children, packages, seen, found);
                packages.pop();
            }
            UnitNode::Unit(plugin) => match describe(plugin, packages) {
                Ok(descriptor) if seen.insert(descriptor.canonical_name.clone()) => {
                    tracing::debug!(module = %descriptor.canonical_name, "module loaded");
                    found.push(descriptor);
                }
                Ok(descriptor) => {
                    tracing::error!(
                        module = %descriptor.canonical_name,
                        "duplicate canonical name, skipping unit"
                    );
                }
                Err(reason) => {
                    tracing::error!(
                        unit = plugin.name(),
                        package = %packages.join("."),
                        %reason,
                        "cannot load unit"
                    );
                }
            },
        }
    }
}

fn describe(plugin: &Arc<dyn Plugin>, packages: &[String]) -> Result<ModuleDescriptor, String> {
    let name = plugin.name();
    if name.is_empty() {
        return Err("unit has an empty name".into());
    }
    if name.contains('.') {
        return Err(format!("unit name {name} contains a dot"));
    }
    let schema = ParameterSchema::parse(&plugin.parameter_schema())
        .map_err(|e| format!("malformed parameter schema: {e}"))?;

    let package = packages.join(".");
    let canonical_name = if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    };
    Ok(ModuleDescriptor {
        canonical_name,
        name: name.to_string(),
        package,
        version: plugin.version().unwrap_or(DEFAULT_VERSION).to_string(),
        description: plugin
            .description()
            .map_or_else(|| format!("Processing module {name}"), str::to_string),
        schema,
        configurations: Vec::new(),
        plugin: Arc::clone(plugin),
    })
}
