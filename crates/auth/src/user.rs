use serde::{Deserialize, Serialize};

use piwi_core::UserId;

use crate::roles::Role;

/// A host user as seen by the capability engine: an identity plus the roles
/// assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub roles: Vec<Role>,
}

impl User {
    pub fn new(id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }
}

/// Request-scoped identity; `user` is `None` for anonymous requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }
}
