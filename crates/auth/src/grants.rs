//! Role/capability grant matrix.
//!
//! The settings screen renders one switch per (role, capability) pair and
//! posts back the keys of the switches that are on, each named
//! `role:capability`. Applying a submission grants every posted pair and
//! revokes every other registered capability for the roles on screen.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Serialize;

use crate::engine::CapabilityEngine;
use crate::error::CapabilityError;
use crate::roles::{Role, RoleStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantKey {
    pub role: Role,
    pub capability: String,
}

impl GrantKey {
    pub fn new(role: Role, capability: impl Into<String>) -> Self {
        Self {
            role,
            capability: capability.into(),
        }
    }
}

impl FromStr for GrantKey {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((role, cap)) if !role.is_empty() && !cap.is_empty() && !cap.contains(':') => {
                Ok(Self::new(Role::new(role.to_string()), cap))
            }
            _ => Err(CapabilityError::MalformedGrantKey(s.to_string())),
        }
    }
}

impl core::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.role, self.capability)
    }
}

/// What a grant-matrix submission changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrantSummary {
    pub granted: usize,
    pub revoked: usize,
}

impl<S> CapabilityEngine<S>
where
    S: RoleStore,
{
    /// Apply a submitted grant matrix for `roles`.
    ///
    /// The whole submission is validated before anything is written: every
    /// key must name one of `roles` and a registered capability. Writes then
    /// go role by role, so a `RoleStore` failure can leave earlier roles
    /// already updated.
    pub fn apply_grant_matrix<I>(&self, roles: &[Role], submitted: I) -> Result<GrantSummary, CapabilityError>
    where
        I: IntoIterator<Item = GrantKey>,
    {
        let on_screen: BTreeSet<&Role> = roles.iter().collect();
        for role in &on_screen {
            if !self.role_store().role_exists(role) {
                return Err(CapabilityError::UnknownRole(role.to_string()));
            }
        }

        let submitted: BTreeSet<GrantKey> = submitted.into_iter().collect();
        for key in &submitted {
            if !on_screen.contains(&key.role) {
                return Err(CapabilityError::UnknownRole(key.role.to_string()));
            }
            if !self.registry().exists_cap(&key.capability) {
                return Err(CapabilityError::UnknownCapability(key.capability.clone()));
            }
        }

        let mut summary = GrantSummary::default();
        for role in on_screen {
            for cap in self.registry().capabilities() {
                let wanted = submitted.contains(&GrantKey::new(role.clone(), cap.slug.clone()));
                let held = self.role_store().has_cap(role, &cap.slug);
                match (wanted, held) {
                    (true, false) => {
                        self.add(role, &cap.slug)?;
                        summary.granted += 1;
                    }
                    (false, true) => {
                        self.revoke(role, &cap.slug)?;
                        summary.revoked += 1;
                    }
                    _ => {}
                }
            }
        }

        tracing::info!(
            granted = summary.granted,
            revoked = summary.revoked,
            "grant matrix applied"
        );
        Ok(summary)
    }

    /// The keys a grant matrix for `roles` would render as switched on.
    pub fn grant_matrix(&self, roles: &[Role]) -> Vec<GrantKey> {
        roles
            .iter()
            .flat_map(|role| {
                self.registry()
                    .capabilities()
                    .filter(move |cap| self.role_store().has_cap(role, &cap.slug))
                    .map(move |cap| GrantKey::new(role.clone(), cap.slug.clone()))
            })
            .collect()
    }
}
