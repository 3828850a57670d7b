//! # Shared two-tier key/value store.
//!
//! One global map plus one private map per [`Scope`]. Reads resolve the caller's
//! private map first, then the global one. Private maps are created on first
//! use and always contain `"scope" = <scope name>`; the global map contains
//! `"scope" = "global"`.
//!
//! Names `"mm"` and `"scope"` are reserved: only the manager scope may declare,
//! set or release them.
//!
//! Every operation takes the same coarse lock, so each call is atomic with
//! respect to every other call. Sequences of calls are not.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::control::{ControlPlane, ManagerApi};
use super::scope::{MANAGER_SCOPE, Scope};
use crate::error::EnvironmentError;

const SCOPE_VAR: &str = "scope";
const GLOBAL_SCOPE: &str = "global";
const RESERVED: [&str; 2] = [MANAGER_SCOPE, SCOPE_VAR];

type Vars = HashMap<String, String>;

#[derive(Debug)]
struct Scopes {
    global: Vars,
    private: HashMap<Scope, Vars>,
}

impl Scopes {
    fn private(&mut self, scope: &Scope) -> &mut Vars {
        self.private.entry(scope.clone()).or_insert_with(|| {
            Vars::from([(SCOPE_VAR.to_string(), scope.name().to_string())])
        })
    }
}

/// Shared state of one application instance.
///
/// Holds the variable maps and the manager control plane. Modules see it
/// through their [`EnvHandle`].
#[derive(Debug)]
pub struct Environment {
    inner: Mutex<Scopes>,
    control: Arc<ControlPlane>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Scopes {
                global: Vars::from([(SCOPE_VAR.to_string(), GLOBAL_SCOPE.to_string())]),
                private: HashMap::new(),
            }),
            control: Arc::new(ControlPlane::default()),
        }
    }

    /// True if `name` exists in the private map of `scope` or globally.
    pub fn find(&self, scope: &Scope, name: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.private(scope).contains_key(name) || inner.global.contains_key(name)
    }

    /// True if `name` exists in the private map of `scope`.
    pub fn find_local(&self, scope: &Scope, name: &str) -> bool {
        self.inner.lock().private(scope).contains_key(name)
    }

    /// True if `name` exists globally.
    pub fn find_global(&self, name: &str) -> bool {
        self.inner.lock().global.contains_key(name)
    }

    /// Private value of `name`, falling back to the global one.
    pub fn get(&self, scope: &Scope, name: &str) -> Result<String, EnvironmentError> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.private(scope).get(name) {
            return Ok(value.clone());
        }
        lookup(&inner.global, name, GLOBAL_SCOPE).cloned()
    }

    /// Global value of `name`.
    pub fn get_global(&self, name: &str) -> Result<String, EnvironmentError> {
        lookup(&self.inner.lock().global, name, GLOBAL_SCOPE).cloned()
    }

    /// Replaces a declared private variable and returns its previous value.
    pub fn set(
        &self,
        scope: &Scope,
        name: &str,
        value: impl Into<String>,
    ) -> Result<String, EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        let vars = inner.private(scope);
        let slot = lookup_mut(vars, name, scope.name())?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Replaces a declared global variable and returns its previous value.
    pub fn set_global(
        &self,
        scope: &Scope,
        name: &str,
        value: impl Into<String>,
    ) -> Result<String, EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        let slot = lookup_mut(&mut inner.global, name, GLOBAL_SCOPE)?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Declares a new private variable.
    pub fn declare(
        &self,
        scope: &Scope,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        insert_new(inner.private(scope), name, value.into(), scope.name())
    }

    /// Declares a new global variable.
    pub fn declare_global(
        &self,
        scope: &Scope,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        insert_new(&mut inner.global, name, value.into(), GLOBAL_SCOPE)
    }

    /// Removes a private variable and returns its value.
    pub fn release(&self, scope: &Scope, name: &str) -> Result<String, EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        remove(inner.private(scope), name, scope.name())
    }

    /// Removes a global variable and returns its value.
    pub fn release_global(&self, scope: &Scope, name: &str) -> Result<String, EnvironmentError> {
        check_restricted(scope, name)?;
        let mut inner = self.inner.lock();
        remove(&mut inner.global, name, GLOBAL_SCOPE)
    }

    /// Drops the whole private map of `scope`.
    ///
    /// The next access from that scope starts from a fresh map.
    pub fn dispose(&self, scope: &Scope) {
        if self.inner.lock().private.remove(scope).is_some() {
            debug!(scope = %scope, "environment scope disposed");
        }
    }

    /// Handle to the manager control plane.
    pub fn manager(&self) -> ManagerApi {
        ManagerApi::new(self.control.clone())
    }

    pub(crate) fn control(&self) -> &ControlPlane {
        &self.control
    }
}

fn check_restricted(scope: &Scope, name: &str) -> Result<(), EnvironmentError> {
    if !scope.is_privileged() && RESERVED.contains(&name) {
        return Err(EnvironmentError::RestrictedVariable {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn undeclared(name: &str, scope: &str) -> EnvironmentError {
    EnvironmentError::UndeclaredVariable {
        name: name.to_string(),
        scope: scope.to_string(),
    }
}

fn lookup<'a>(vars: &'a Vars, name: &str, scope: &str) -> Result<&'a String, EnvironmentError> {
    vars.get(name).ok_or_else(|| undeclared(name, scope))
}

fn lookup_mut<'a>(
    vars: &'a mut Vars,
    name: &str,
    scope: &str,
) -> Result<&'a mut String, EnvironmentError> {
    vars.get_mut(name).ok_or_else(|| undeclared(name, scope))
}

fn remove(vars: &mut Vars, name: &str, scope: &str) -> Result<String, EnvironmentError> {
    vars.remove(name).ok_or_else(|| undeclared(name, scope))
}

fn insert_new(vars: &mut Vars, name: &str, value: String, scope: &str) -> Result<(), EnvironmentError> {
    if vars.contains_key(name) {
        return Err(EnvironmentError::DuplicateVariable {
            name: name.to_string(),
            scope: scope.to_string(),
        });
    }
    vars.insert(name.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_scope_prepopulated() {
        let env = Environment::new();
        let scope = Scope::module("heartbeat");
        assert!(env.find_local(&scope, "scope"));
        assert_eq!(env.get(&scope, "scope").unwrap(), "heartbeat");
        assert_eq!(env.get_global("scope").unwrap(), "global");
    }

    #[test]
    fn test_declare_get_and_duplicate() {
        let env = Environment::new();
        let scope = Scope::module("a");
        env.declare(&scope, "x", "1").unwrap();
        assert_eq!(env.get(&scope, "x").unwrap(), "1");
        assert_eq!(
            env.declare(&scope, "x", "2"),
            Err(EnvironmentError::DuplicateVariable {
                name: "x".into(),
                scope: "a".into()
            })
        );
    }

    #[test]
    fn test_private_shadows_global() {
        let env = Environment::new();
        let a = Scope::module("a");
        let b = Scope::module("b");
        env.declare_global(&a, "x", "g").unwrap();
        env.declare(&a, "x", "p").unwrap();
        assert_eq!(env.get(&a, "x").unwrap(), "p");
        assert_eq!(env.get(&b, "x").unwrap(), "g");
        assert!(env.find(&b, "x"));
        assert!(!env.find_local(&b, "x"));
    }

    #[test]
    fn test_set_requires_declaration_and_returns_previous() {
        let env = Environment::new();
        let scope = Scope::module("a");
        assert!(matches!(
            env.set(&scope, "x", "1"),
            Err(EnvironmentError::UndeclaredVariable { .. })
        ));
        env.declare(&scope, "x", "1").unwrap();
        assert_eq!(env.set(&scope, "x", "2").unwrap(), "1");
        assert_eq!(env.get(&scope, "x").unwrap(), "2");
    }

    #[test]
    fn test_reserved_names_protected() {
        let env = Environment::new();
        let worker = Scope::module("a");
        let manager = Scope::manager();
        let restricted = |r: Result<(), EnvironmentError>| {
            matches!(r, Err(EnvironmentError::RestrictedVariable { .. }))
        };
        assert!(restricted(env.declare_global(&worker, "mm", "x")));
        assert!(restricted(env.set(&worker, "scope", "x").map(drop)));
        assert!(restricted(env.release(&worker, "scope").map(drop)));

        env.declare_global(&manager, "mm", "id").unwrap();
        assert_eq!(env.get(&worker, "mm").unwrap(), "id");
        assert!(restricted(env.release_global(&worker, "mm").map(drop)));
        assert_eq!(env.release_global(&manager, "mm").unwrap(), "id");
        assert!(!env.find_global("mm"));
    }

    #[test]
    fn test_release_and_dispose() {
        let env = Environment::new();
        let scope = Scope::module("a");
        env.declare(&scope, "x", "1").unwrap();
        assert_eq!(env.release(&scope, "x").unwrap(), "1");
        assert!(env.release(&scope, "x").is_err());

        env.declare(&scope, "y", "1").unwrap();
        env.dispose(&scope);
        assert!(!env.find_local(&scope, "y"));
        assert_eq!(env.get(&scope, "scope").unwrap(), "a");
    }

    #[test]
    fn test_manager_api_shares_control_plane() {
        let env = Environment::new();
        assert!(env.manager().shutdown());
        assert!(env.manager().is_shutdown_requested());
        env.control().reset();
        assert!(!env.manager().is_shutdown_requested());
    }
}
