//! The interface every processing module implements.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ControlPlaneError;
use crate::pipeline::Stage;

/// A processing module: declares its parameters and builds stages from
/// validated parameter sets.
///
/// The registry checks parameters against [`Plugin::parameter_schema`]
/// before calling [`Plugin::build`], so `build` only has to handle
/// conforming input.
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Short name, unique within its package; must not contain dots.
    fn name(&self) -> &str;

    /// Declared version, if any.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Declared description, if any.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Parameter schema as JSON; see [`super::ParameterSchema`].
    fn parameter_schema(&self) -> Value;

    /// Builds a stage for one configuration's parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be instantiated with
    /// `parameters`.
    fn build(&self, parameters: &Value) -> Result<Arc<dyn Stage>, ControlPlaneError>;
}
