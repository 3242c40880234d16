//! Two-tier capability resolution
//!
//! Tier 1 reads the plugin's static operation table; an empty slot is
//! reported as the plugin lacking the capability. Tier 2 covers the closed
//! set of extension operations: it requires the plugin to carry a symbol
//! provider and resolves the operation by its exact exported name. There is
//! no third tier; anything else is unavailable.

use std::sync::Arc;

use super::{BackendPlugin, ExtensionFn, ExtensionOp, OperationId};
use crate::error::{Error, Result};

/// Tier 1: fetch an operation out of the plugin's static table
///
/// `slot` must be the table member matching `id`; an empty slot maps to
/// `PluginNotFound`, same as an unregistered backend.
pub fn table_op<'a, T: ?Sized>(
    plugin: &'a BackendPlugin,
    id: OperationId,
    slot: &'a Option<Arc<T>>,
) -> Result<&'a Arc<T>> {
    slot.as_ref()
        .ok_or_else(|| Error::operation_missing(plugin.keystore_type(), id.name()))
}

/// Tier 2: resolve an extension operation by exported symbol name
///
/// Requires the plugin to expose a symbol provider; a plugin without one
/// cannot host extension operations (`PluginNotFound`). A provider that does
/// not export the name, or exports it with the wrong shape, is
/// `FunctionNotFound`.
pub fn extension_op(plugin: &BackendPlugin, op: ExtensionOp) -> Result<ExtensionFn> {
    let symbols = plugin.symbols().ok_or_else(|| {
        Error::PluginNotFound(format!(
            "backend for {:?} exposes no extension symbols",
            plugin.keystore_type()
        ))
    })?;

    let resolved = symbols
        .resolve(op.symbol())
        .ok_or_else(|| Error::symbol_missing(op.symbol()))?;

    if !resolved.matches(op) {
        return Err(Error::symbol_missing(op.symbol()));
    }
    Ok(resolved)
}
