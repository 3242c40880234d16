use std::{collections::HashMap, sync::Arc};

use super::BackendPlugin;
use crate::{
    error::{Error, Result},
    types::KeystoreType,
};

/// Registry of loaded backend plugins, keyed by keystore type
///
/// Populated during framework initialization and read-only afterwards; once
/// handed to a [`Session`](crate::session::Session) only shared lookups
/// remain possible, so concurrent reads from multiple threads are safe.
#[derive(Default)]
pub struct BackendRegistry {
    plugins: HashMap<KeystoreType, Arc<BackendPlugin>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin for its keystore type
    ///
    /// At most one plugin per type is held; an already-registered plugin for
    /// the same type is displaced and returned.
    pub fn register(&mut self, plugin: BackendPlugin) -> Option<Arc<BackendPlugin>> {
        self.plugins
            .insert(plugin.keystore_type(), Arc::new(plugin))
    }

    /// Resolve a keystore type to its plugin
    pub fn resolve(&self, kstype: KeystoreType) -> Result<&Arc<BackendPlugin>> {
        self.plugins.get(&kstype).ok_or_else(|| Error::no_plugin(kstype))
    }

    pub fn is_registered(&self, kstype: KeystoreType) -> bool {
        self.plugins.contains_key(&kstype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::OperationTable;
    use crate::error::ErrorKind;

    fn empty_plugin(kstype: KeystoreType) -> BackendPlugin {
        BackendPlugin::new(kstype, OperationTable::default(), None)
    }

    #[test]
    fn resolve_registered_type() {
        let mut registry = BackendRegistry::new();
        registry.register(empty_plugin(KeystoreType::File));

        let plugin = registry.resolve(KeystoreType::File).unwrap();
        assert_eq!(plugin.keystore_type(), KeystoreType::File);
    }

    #[test]
    fn resolve_unregistered_type_is_plugin_not_found() {
        let registry = BackendRegistry::new();
        let err = registry.resolve(KeystoreType::Token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginNotFound);
    }

    #[test]
    fn register_displaces_previous_plugin() {
        let mut registry = BackendRegistry::new();
        assert!(registry.register(empty_plugin(KeystoreType::Database)).is_none());

        let displaced = registry.register(empty_plugin(KeystoreType::Database));
        assert!(displaced.is_some());
        assert!(registry.is_registered(KeystoreType::Database));
    }
}
