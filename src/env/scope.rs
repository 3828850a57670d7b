//! # Caller identity for environment access.
//!
//! Every [`Environment`](super::Environment) operation is performed on behalf
//! of a [`Scope`]. The scope selects the private map a lookup resolves against
//! first and decides whether reserved names may be written.
//!
//! Worker scopes are keyed by module name, so every instance of one module
//! shares the same private map. The privileged manager scope can only be minted
//! inside the crate.

use std::fmt;
use std::sync::Arc;

/// Name of the manager's own scope, and of its global marker variable.
pub(crate) const MANAGER_SCOPE: &str = "mm";

/// Identity token of an environment caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    name: Arc<str>,
    privileged: bool,
}

impl Scope {
    /// Unprivileged scope of the module registered as `name`.
    pub fn module(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            privileged: false,
        }
    }

    /// Scope of the module manager; allowed to touch reserved names.
    pub(crate) fn manager() -> Self {
        Self {
            name: Arc::from(MANAGER_SCOPE),
            privileged: true,
        }
    }

    /// Scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for the manager scope.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileged {
            write!(f, "[{}]", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_scope_cannot_impersonate_manager() {
        let fake = Scope::module(MANAGER_SCOPE);
        let real = Scope::manager();
        assert_eq!(fake.name(), real.name());
        assert_ne!(fake, real);
        assert!(!fake.is_privileged());
        assert!(real.is_privileged());
    }

    #[test]
    fn test_same_module_same_scope() {
        assert_eq!(Scope::module("heartbeat"), Scope::module(String::from("heartbeat")));
    }
}
