//! # Module registry.
//!
//! Maps a module name (as used in configuration and in
//! [`ManagerApi::register`](crate::ManagerApi::register)) to a factory that builds
//! a fresh instance. Names are resolved when the manager creates a runner; there
//! is no reflection or dynamic loading.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::contract::Module;

/// Builds one module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Name → factory table.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn with<F, M>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module,
    {
        self.insert(name, factory);
        self
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn insert<F, M>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module,
    {
        let factory: ModuleFactory = Arc::new(move || Box::new(factory()) as Box<dyn Module>);
        self.factories.insert(name.into(), factory);
    }

    /// Builds a new instance of `name`, or `None` if it is not registered.
    pub fn create(&self, name: &str) -> Option<Box<dyn Module>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
