use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Role identifier (host-managed permission bundle, e.g. "editor").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host role storage: which capability slugs each role holds.
///
/// The engine never owns grants; it reads and mutates them through this
/// seam. Capability names here are raw host capabilities, so a store may
/// also answer for capabilities the registry knows nothing about.
pub trait RoleStore: Send + Sync {
    /// Every role known to the host.
    fn roles(&self) -> Vec<Role>;

    fn role_exists(&self, role: &Role) -> bool;

    /// Raw host check, no dependency resolution.
    fn has_cap(&self, role: &Role, cap: &str) -> bool;

    fn grant(&self, role: &Role, cap: &str) -> Result<(), CapabilityError>;

    fn remove(&self, role: &Role, cap: &str) -> Result<(), CapabilityError>;
}

impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    fn roles(&self) -> Vec<Role> {
        (**self).roles()
    }

    fn role_exists(&self, role: &Role) -> bool {
        (**self).role_exists(role)
    }

    fn has_cap(&self, role: &Role, cap: &str) -> bool {
        (**self).has_cap(role, cap)
    }

    fn grant(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        (**self).grant(role, cap)
    }

    fn remove(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        (**self).remove(role, cap)
    }
}

/// In-memory role storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    inner: RwLock<BTreeMap<Role, BTreeSet<String>>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given roles, none holding anything.
    pub fn with_roles<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        let store = Self::new();
        for role in roles {
            store.add_role(role.into(), std::iter::empty::<String>());
        }
        store
    }

    /// Create (or replace) a role with an initial set of host capabilities.
    pub fn add_role<I, C>(&self, role: Role, caps: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        if let Ok(mut map) = self.inner.write() {
            map.insert(role, caps.into_iter().map(Into::into).collect());
        }
    }

    /// Capabilities currently held by `role`, ordered.
    pub fn caps_of(&self, role: &Role) -> Vec<String> {
        match self.inner.read() {
            Ok(map) => map
                .get(role)
                .map(|caps| caps.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => vec![],
        }
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Role::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::new(value)
    }
}

fn poisoned() -> CapabilityError {
    CapabilityError::Storage("role store lock poisoned".to_string())
}

impl RoleStore for InMemoryRoleStore {
    fn roles(&self) -> Vec<Role> {
        match self.inner.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn role_exists(&self, role: &Role) -> bool {
        self.inner
            .read()
            .map(|map| map.contains_key(role))
            .unwrap_or(false)
    }

    fn has_cap(&self, role: &Role, cap: &str) -> bool {
        self.inner
            .read()
            .map(|map| map.get(role).is_some_and(|caps| caps.contains(cap)))
            .unwrap_or(false)
    }

    fn grant(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let caps = map
            .get_mut(role)
            .ok_or_else(|| CapabilityError::UnknownRole(role.to_string()))?;
        caps.insert(cap.to_string());
        Ok(())
    }

    fn remove(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let caps = map
            .get_mut(role)
            .ok_or_else(|| CapabilityError::UnknownRole(role.to_string()))?;
        caps.remove(cap);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_remove_round_trip() {
        let store = InMemoryRoleStore::with_roles(["editor"]);
        let editor = Role::new("editor");

        store.grant(&editor, "view_stock").unwrap();
        assert!(store.has_cap(&editor, "view_stock"));

        store.remove(&editor, "view_stock").unwrap();
        assert!(!store.has_cap(&editor, "view_stock"));
        // Removing something not held is fine.
        store.remove(&editor, "view_stock").unwrap();
    }

    #[test]
    fn unknown_role_is_an_error() {
        let store = InMemoryRoleStore::new();
        let ghost = Role::new("ghost");
        assert_eq!(
            store.grant(&ghost, "view_stock").unwrap_err(),
            CapabilityError::UnknownRole("ghost".to_string())
        );
        assert!(!store.has_cap(&ghost, "view_stock"));
    }

    #[test]
    fn poisoned_lock_is_a_storage_error() {
        let store = Arc::new(InMemoryRoleStore::with_roles(["editor"]));
        let holder = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        let editor = Role::new("editor");
        assert!(matches!(store.grant(&editor, "view_stock"), Err(CapabilityError::Storage(_))));
        assert!(matches!(store.remove(&editor, "view_stock"), Err(CapabilityError::Storage(_))));
    }

    #[test]
    fn roles_are_listed_in_order() {
        let store = InMemoryRoleStore::with_roles(["subscriber", "administrator", "editor"]);
        let names: Vec<_> = store.roles().iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["administrator", "editor", "subscriber"]);
    }
}
