//! Plugin reference resolution.
//!
//! # Responsibilities
//! - Normalize any [`PluginRef`] shape into a ready [`Plugin`] descriptor
//! - Accumulate and merge parameters across indirection layers with the
//!   documented precedences
//! - Bound the recursion so cyclic indirection fails instead of spinning
//!
//! # Design Decisions
//! - Resolution is pure: the registry is read, nothing is mutated; applying
//!   the resolved descriptor is the host's job
//! - A literal descriptor terminates resolution as-is; parameters only shape
//!   what factories produce

use crate::errors::SetupError;
use crate::plugin::{Params, Plugin, PluginRef, PluginRegistry};

/// Upper bound on reference indirection, including `requires` recursion.
pub const MAX_RESOLVE_DEPTH: usize = 32;

/// Resolve a reference with no accumulated parameters.
pub fn resolve(reference: &PluginRef, registry: &PluginRegistry) -> Result<Plugin, SetupError> {
    resolve_with(reference, &Params::new(), registry, MAX_RESOLVE_DEPTH)
}

/// Resolve a reference under already-accumulated parameters.
///
/// `depth` decrements per indirection layer; hitting zero reports a
/// [`SetupError::PluginDepth`].
pub fn resolve_with(
    reference: &PluginRef,
    params: &Params,
    registry: &PluginRegistry,
    depth: usize,
) -> Result<Plugin, SetupError> {
    if depth == 0 {
        return Err(SetupError::PluginDepth {
            limit: MAX_RESOLVE_DEPTH,
        });
    }
    match reference {
        PluginRef::Literal(plugin) => Ok(plugin.clone()),
        PluginRef::Named(name) => {
            let inner = registry
                .get(name)
                .ok_or_else(|| SetupError::UnknownPlugin { name: name.clone() })?;
            resolve_with(inner, params, registry, depth - 1)
        }
        PluginRef::Factory(make) => {
            let produced = make(params);
            resolve_with(&produced, params, registry, depth - 1)
        }
        PluginRef::Package { inner, params: own } => {
            resolve_with(inner, &merged(params, own), registry, depth - 1)
        }
        PluginRef::Redirect { make, params: own } => {
            let produced = make(own);
            resolve_with(&produced, &merged(own, params), registry, depth - 1)
        }
    }
}

/// Shallow merge; `overlay` wins on key collision.
fn merged(base: &Params, overlay: &Params) -> Params {
    let mut out = base.clone();
    for (key, value) in overlay {
        out.insert(key.clone(), value.clone());
    }
    out
}
