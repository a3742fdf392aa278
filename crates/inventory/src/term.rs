//! Location and holder terms.
//!
//! Both are flat taxonomies: an identifier and a display name.

use serde::{Deserialize, Serialize};

use piwi_core::{DomainError, Entity, HolderId, LocationId};

/// A place where stock is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

/// Someone stock is moved to (a person, a team, a partner organisation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub id: HolderId,
    pub name: String,
}

fn validate_name(kind: &str, name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{kind} name cannot be empty")));
    }
    Ok(name.to_string())
}

impl Location {
    pub fn new(id: LocationId, name: &str) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            name: validate_name("location", name)?,
        })
    }
}

impl Holder {
    pub fn new(id: HolderId, name: &str) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            name: validate_name("holder", name)?,
        })
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Holder {
    type Id = HolderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
