//! Dependency-aware capability checks over host roles.

use crate::error::CapabilityError;
use crate::registry::CapabilityRegistry;
use crate::roles::{Role, RoleStore};
use crate::user::{Session, User};

/// Capability engine: a registry plus the host storage holding the grants.
///
/// - No IO of its own (grants go through `RoleStore`)
/// - No panics
/// - Unknown capabilities, contexts and roles are rejected before any write
/// - Bulk revokes write role by role; a `RoleStore` failure part way through
///   leaves the roles already handled changed
#[derive(Debug)]
pub struct CapabilityEngine<S> {
    registry: CapabilityRegistry,
    roles: S,
}

impl<S> CapabilityEngine<S>
where
    S: RoleStore,
{
    pub fn new(registry: CapabilityRegistry, roles: S) -> Self {
        Self { registry, roles }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.registry
    }

    pub fn role_store(&self) -> &S {
        &self.roles
    }

    fn ensure_registered(&self, cap: &str) -> Result<(), CapabilityError> {
        if self.registry.exists_cap(cap) {
            Ok(())
        } else {
            tracing::error!(capability = cap, "capability is not registered");
            Err(CapabilityError::UnknownCapability(cap.to_string()))
        }
    }

    fn ensure_role(&self, role: &Role) -> Result<(), CapabilityError> {
        if self.roles.role_exists(role) {
            Ok(())
        } else {
            tracing::error!(role = %role, "role is not known to the host");
            Err(CapabilityError::UnknownRole(role.to_string()))
        }
    }

    /// Resolve `None` to every host role, `Some(role)` to that role.
    fn target_roles(&self, role: Option<&Role>) -> Result<Vec<Role>, CapabilityError> {
        match role {
            Some(role) => {
                self.ensure_role(role)?;
                Ok(vec![role.clone()])
            }
            None => Ok(self.roles.roles()),
        }
    }

    /// Grant a registered capability to a role.
    pub fn add(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        self.ensure_registered(cap)?;
        self.ensure_role(role)?;
        self.roles.grant(role, cap)?;
        tracing::info!(role = %role, capability = cap, "capability granted");
        Ok(())
    }

    /// Revoke a registered capability from a role.
    pub fn revoke(&self, role: &Role, cap: &str) -> Result<(), CapabilityError> {
        self.ensure_registered(cap)?;
        self.ensure_role(role)?;
        self.roles.remove(role, cap)?;
        tracing::info!(role = %role, capability = cap, "capability revoked");
        Ok(())
    }

    /// Revoke every capability of `context`.
    ///
    /// `role = None` targets every role known to the host.
    pub fn revoke_by_context(&self, role: Option<&Role>, context: &str) -> Result<(), CapabilityError> {
        let caps = self.registry.get_caps_by_context(context)?;
        let targets = self.target_roles(role)?;

        for target in &targets {
            for cap in &caps {
                self.roles.remove(target, cap)?;
            }
        }

        tracing::info!(
            context,
            roles = targets.len(),
            capabilities = caps.len(),
            "context revoked"
        );
        Ok(())
    }

    /// Revoke every registered capability.
    ///
    /// `role = None` targets every role known to the host. Host capabilities
    /// the registry does not model are left alone.
    pub fn revoke_all(&self, role: Option<&Role>) -> Result<(), CapabilityError> {
        let targets = self.target_roles(role)?;

        for target in &targets {
            for cap in self.registry.capabilities() {
                self.roles.remove(target, &cap.slug)?;
            }
        }

        tracing::info!(roles = targets.len(), "all registered capabilities revoked");
        Ok(())
    }

    /// Does `role` hold `cap` (and, unless `skip_dep`, its whole dependency chain)?
    ///
    /// A capability the registry does not know is treated as a primitive host
    /// capability and checked as-is.
    pub fn role_can(&self, role: &Role, cap: &str, skip_dep: bool) -> Result<bool, CapabilityError> {
        self.ensure_role(role)?;

        if !self.registry.exists_cap(cap) {
            return Ok(self.roles.has_cap(role, cap));
        }

        if skip_dep {
            return Ok(self.roles.has_cap(role, cap));
        }

        let chain = self.registry.dependency_chain(cap)?;
        Ok(chain.iter().all(|link| self.roles.has_cap(role, link)))
    }

    /// True iff any of the user's roles satisfies `role_can`.
    ///
    /// Roles the host no longer knows grant nothing.
    pub fn user_can(&self, user: &User, cap: &str, skip_dep: bool) -> bool {
        user.roles.iter().any(|role| match self.role_can(role, cap, skip_dep) {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(user = %user.id, role = %role, error = %err, "ignoring role");
                false
            }
        })
    }

    /// `user_can` for the session's user; anonymous sessions can do nothing.
    pub fn current_user_can(&self, session: &Session, cap: &str, skip_dep: bool) -> bool {
        session
            .user
            .as_ref()
            .is_some_and(|user| self.user_can(user, cap, skip_dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityDef, ContextDef};
    use crate::roles::InMemoryRoleStore;
    use piwi_core::UserId;
    use proptest::prelude::*;

    fn stock_engine() -> CapabilityEngine<InMemoryRoleStore> {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_context("stock", ContextDef::new("Stock", ""))
            .unwrap();
        registry
            .register_cap("view_stock", CapabilityDef::new("stock", "View stock"))
            .unwrap();
        registry
            .register_cap(
                "edit_stock",
                CapabilityDef::new("stock", "Edit stock").depends_on("view_stock"),
            )
            .unwrap();
        registry
            .register_context("holders", ContextDef::new("Holders", ""))
            .unwrap();
        registry
            .register_cap("view_holders", CapabilityDef::new("holders", "View holders"))
            .unwrap();

        let roles = InMemoryRoleStore::with_roles(["editor", "author"]);
        CapabilityEngine::new(registry, roles)
    }

    fn editor() -> Role {
        Role::new("editor")
    }

    #[test]
    fn grant_makes_role_capable() {
        let engine = stock_engine();
        assert!(!engine.role_can(&editor(), "view_stock", false).unwrap());

        engine.add(&editor(), "view_stock").unwrap();
        assert!(engine.role_can(&editor(), "view_stock", false).unwrap());
    }

    #[test]
    fn unmet_dependency_denies_unless_skipped() {
        let engine = stock_engine();
        engine.add(&editor(), "edit_stock").unwrap();

        assert!(!engine.role_can(&editor(), "edit_stock", false).unwrap());
        assert!(engine.role_can(&editor(), "edit_stock", true).unwrap());

        engine.add(&editor(), "view_stock").unwrap();
        assert!(engine.role_can(&editor(), "edit_stock", false).unwrap());
    }

    #[test]
    fn unregistered_capability_falls_back_to_host() {
        let engine = stock_engine();
        engine
            .role_store()
            .add_role(Role::new("administrator"), ["manage_options"]);

        let admin = Role::new("administrator");
        assert!(engine.role_can(&admin, "manage_options", false).unwrap());
        assert!(!engine.role_can(&editor(), "manage_options", false).unwrap());
    }

    #[test]
    fn add_rejects_unregistered_capability() {
        let engine = stock_engine();
        let err = engine.add(&editor(), "manage_options").unwrap_err();
        assert_eq!(err, CapabilityError::UnknownCapability("manage_options".into()));
        assert!(engine.role_store().caps_of(&editor()).is_empty());
    }

    #[test]
    fn unknown_role_is_an_error() {
        let engine = stock_engine();
        let ghost = Role::new("ghost");
        assert_eq!(
            engine.role_can(&ghost, "view_stock", false).unwrap_err(),
            CapabilityError::UnknownRole("ghost".into())
        );
        assert!(engine.add(&ghost, "view_stock").is_err());
    }

    #[test]
    fn revoke_by_context_without_role_hits_every_role() {
        let engine = stock_engine();
        let author = Role::new("author");
        for role in [editor(), author.clone()] {
            engine.add(&role, "view_stock").unwrap();
            engine.add(&role, "edit_stock").unwrap();
            engine.add(&role, "view_holders").unwrap();
        }

        engine.revoke_by_context(None, "stock").unwrap();

        for role in [editor(), author] {
            assert_eq!(engine.role_store().caps_of(&role), vec!["view_holders"]);
        }
    }

    #[test]
    fn revoke_by_context_for_one_role() {
        let engine = stock_engine();
        let author = Role::new("author");
        engine.add(&editor(), "view_stock").unwrap();
        engine.add(&author, "view_stock").unwrap();

        engine.revoke_by_context(Some(&editor()), "stock").unwrap();

        assert!(!engine.role_can(&editor(), "view_stock", false).unwrap());
        assert!(engine.role_can(&author, "view_stock", false).unwrap());
        assert!(engine.revoke_by_context(Some(&editor()), "nope").is_err());
    }

    #[test]
    fn revoke_all_keeps_host_capabilities() {
        let engine = stock_engine();
        engine
            .role_store()
            .add_role(editor(), ["read", "view_stock", "view_holders"]);

        engine.revoke_all(None).unwrap();

        assert_eq!(engine.role_store().caps_of(&editor()), vec!["read"]);
    }

    #[test]
    fn revoke_all_for_one_role() {
        let engine = stock_engine();
        let author = Role::new("author");
        engine
            .role_store()
            .add_role(editor(), ["read", "view_stock", "edit_stock", "view_holders"]);
        engine.add(&author, "view_stock").unwrap();
        engine.add(&author, "view_holders").unwrap();

        engine.revoke_all(Some(&editor())).unwrap();

        assert_eq!(engine.role_store().caps_of(&editor()), vec!["read"]);
        assert_eq!(engine.role_store().caps_of(&author), vec!["view_holders", "view_stock"]);
    }

    #[test]
    fn revoke_all_for_unknown_role_writes_nothing() {
        let engine = stock_engine();
        engine.add(&editor(), "view_stock").unwrap();

        let err = engine.revoke_all(Some(&Role::new("ghost"))).unwrap_err();
        assert_eq!(err, CapabilityError::UnknownRole("ghost".into()));
        assert_eq!(engine.role_store().caps_of(&editor()), vec!["view_stock"]);
        assert!(engine.role_store().caps_of(&Role::new("author")).is_empty());
    }

    #[test]
    fn user_can_if_any_role_can() {
        let engine = stock_engine();
        engine.add(&editor(), "view_stock").unwrap();

        let user = User::new(UserId::new(), [Role::new("author"), editor()]);
        assert!(engine.user_can(&user, "view_stock", false));
        assert!(!engine.user_can(&user, "edit_stock", false));

        let stale = User::new(UserId::new(), [Role::new("ghost")]);
        assert!(!engine.user_can(&stale, "view_stock", false));
    }

    #[test]
    fn anonymous_session_can_do_nothing() {
        let engine = stock_engine();
        engine.add(&editor(), "view_stock").unwrap();

        assert!(!engine.current_user_can(&Session::anonymous(), "view_stock", false));

        let session = Session::authenticated(User::new(UserId::new(), [editor()]));
        assert!(engine.current_user_can(&session, "view_stock", false));
    }

    proptest! {
        /// Property: `role_can(R, C)` equals host_has(R, C) && role_can(R, dep(C)),
        /// and with `skip_dep` it equals host_has(R, C).
        #[test]
        fn role_can_matches_recursive_definition(
            grants in prop::collection::vec(any::<bool>(), 4)
        ) {
            let mut registry = CapabilityRegistry::new();
            registry.register_context("stock", ContextDef::new("Stock", "")).unwrap();
            let slugs = ["c0", "c1", "c2", "c3"];
            registry.register_cap("c0", CapabilityDef::new("stock", "c0")).unwrap();
            for pair in slugs.windows(2) {
                registry
                    .register_cap(pair[1], CapabilityDef::new("stock", pair[1]).depends_on(pair[0]))
                    .unwrap();
            }

            let held: Vec<&str> = slugs
                .iter()
                .zip(&grants)
                .filter(|(_, g)| **g)
                .map(|(s, _)| *s)
                .collect();
            let store = InMemoryRoleStore::new();
            store.add_role(editor(), held);
            let engine = CapabilityEngine::new(registry, store);

            let mut expected_prev = true;
            for (i, slug) in slugs.iter().enumerate() {
                let expected = grants[i] && expected_prev;
                prop_assert_eq!(engine.role_can(&editor(), slug, false).unwrap(), expected);
                prop_assert_eq!(engine.role_can(&editor(), slug, true).unwrap(), grants[i]);
                expected_prev = expected;
            }
        }
    }
}
