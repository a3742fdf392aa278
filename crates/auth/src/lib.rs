//! `piwi-auth`: capability engine for the warehouse.
//!
//! Capabilities are named permissions grouped into contexts. A capability may
//! depend on another capability of the same context; a role can use a
//! capability only when it also holds the whole dependency chain. Grants are
//! persisted by the host through the [`RoleStore`] seam.
//!
//! No HTTP or storage dependencies.

pub mod capability;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod explain;
pub mod grants;
pub mod registry;
pub mod roles;
pub mod user;

pub use capability::{Capability, CapabilityContext, CapabilityDef, ContextDef};
pub use defaults::register_defaults;
pub use engine::CapabilityEngine;
pub use error::CapabilityError;
pub use explain::{AuthorizationExplanation, ChainLink};
pub use grants::{GrantKey, GrantSummary};
pub use registry::CapabilityRegistry;
pub use roles::{InMemoryRoleStore, Role, RoleStore};
pub use user::{Session, User};
