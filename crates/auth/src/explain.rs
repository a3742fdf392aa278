// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

use serde::Serialize;

use crate::engine::CapabilityEngine;
use crate::error::CapabilityError;
use crate::roles::{Role, RoleStore};

/// One link of a capability's dependency chain and whether the role holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub capability: String,
    pub held: bool,
}

/// Detailed explanation of a `role_can` decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub role: String,
    pub capability: String,
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// `false` when the capability is unregistered and was checked as a raw
    /// host capability.
    pub registered: bool,

    /// The capability followed by its dependencies, root last.
    pub chain: Vec<ChainLink>,

    /// Capabilities that would have to be granted for the check to pass,
    /// closest to the requested capability first.
    pub missing: Vec<String>,
}

impl<S> CapabilityEngine<S>
where
    S: RoleStore,
{
    /// Explain why `role_can(role, cap, false)` is (or would be) answered
    /// the way it is.
    pub fn explain_role_can(
        &self,
        role: &Role,
        cap: &str,
    ) -> Result<AuthorizationExplanation, CapabilityError> {
        let granted = self.role_can(role, cap, false)?;
        let store = self.role_store();

        if !self.registry().exists_cap(cap) {
            let reason = if granted {
                format!("role '{role}' holds host capability '{cap}'")
            } else {
                format!("role '{role}' does not hold host capability '{cap}'")
            };
            return Ok(AuthorizationExplanation {
                role: role.to_string(),
                capability: cap.to_string(),
                granted,
                reason,
                registered: false,
                chain: vec![ChainLink {
                    capability: cap.to_string(),
                    held: granted,
                }],
                missing: if granted { vec![] } else { vec![cap.to_string()] },
            });
        }

        let chain: Vec<ChainLink> = self
            .registry()
            .dependency_chain(cap)?
            .into_iter()
            .map(|capability| ChainLink {
                held: store.has_cap(role, &capability),
                capability,
            })
            .collect();

        let missing: Vec<String> = chain
            .iter()
            .filter(|link| !link.held)
            .map(|link| link.capability.clone())
            .collect();

        let reason = match missing.first() {
            None if chain.len() == 1 => format!("role '{role}' holds '{cap}'"),
            None => format!(
                "role '{role}' holds '{cap}' and its {} dependencies",
                chain.len() - 1
            ),
            Some(first) if first == cap => format!("role '{role}' does not hold '{cap}'"),
            Some(first) => format!("role '{role}' holds '{cap}' but not its dependency '{first}'"),
        };

        Ok(AuthorizationExplanation {
            role: role.to_string(),
            capability: cap.to_string(),
            granted,
            reason,
            registered: true,
            chain,
            missing,
        })
    }
}
