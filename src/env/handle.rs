//! # Scoped environment handle.
//!
//! An [`EnvHandle`] binds the shared [`Environment`] to the scope of one module.
//! It is what a module receives in `initialise`; every call is forwarded with
//! that scope.

use std::sync::Arc;

use super::control::ManagerApi;
use super::environment::Environment;
use super::scope::Scope;
use crate::error::EnvironmentError;

/// Environment view of one module.
#[derive(Debug, Clone)]
pub struct EnvHandle {
    env: Arc<Environment>,
    scope: Scope,
}

impl EnvHandle {
    /// Binds `env` to `scope`.
    pub fn new(env: Arc<Environment>, scope: Scope) -> Self {
        Self { env, scope }
    }

    /// The scope this handle acts for.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// See [`Environment::find`].
    pub fn find(&self, name: &str) -> bool {
        self.env.find(&self.scope, name)
    }

    /// See [`Environment::find_local`].
    pub fn find_local(&self, name: &str) -> bool {
        self.env.find_local(&self.scope, name)
    }

    /// See [`Environment::find_global`].
    pub fn find_global(&self, name: &str) -> bool {
        self.env.find_global(name)
    }

    /// See [`Environment::get`].
    pub fn get(&self, name: &str) -> Result<String, EnvironmentError> {
        self.env.get(&self.scope, name)
    }

    /// See [`Environment::get_global`].
    pub fn get_global(&self, name: &str) -> Result<String, EnvironmentError> {
        self.env.get_global(name)
    }

    /// See [`Environment::set`].
    pub fn set(&self, name: &str, value: impl Into<String>) -> Result<String, EnvironmentError> {
        self.env.set(&self.scope, name, value)
    }

    /// See [`Environment::set_global`].
    pub fn set_global(
        &self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<String, EnvironmentError> {
        self.env.set_global(&self.scope, name, value)
    }

    /// See [`Environment::declare`].
    pub fn declare(&self, name: &str, value: impl Into<String>) -> Result<(), EnvironmentError> {
        self.env.declare(&self.scope, name, value)
    }

    /// See [`Environment::declare_global`].
    pub fn declare_global(
        &self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), EnvironmentError> {
        self.env.declare_global(&self.scope, name, value)
    }

    /// See [`Environment::release`].
    pub fn release(&self, name: &str) -> Result<String, EnvironmentError> {
        self.env.release(&self.scope, name)
    }

    /// See [`Environment::release_global`].
    pub fn release_global(&self, name: &str) -> Result<String, EnvironmentError> {
        self.env.release_global(&self.scope, name)
    }

    /// Drops this scope's private map.
    pub fn dispose(&self) {
        self.env.dispose(&self.scope)
    }

    /// Manager control plane.
    pub fn manager(&self) -> ManagerApi {
        self.env.manager()
    }

    pub(crate) fn environment(&self) -> &Arc<Environment> {
        &self.env
    }
}
