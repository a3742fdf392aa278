use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// A named grouping of capabilities (presentation + validation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityContext {
    pub slug: String,
    pub label: String,
    pub description: String,
}

/// A named permission, optionally depending on another capability of the
/// same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub slug: String,
    pub label: String,
    pub description: String,
    pub context: String,
    pub dependency: Option<String>,
}

/// Arguments of `CapabilityRegistry::register_context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextDef {
    pub label: String,
    pub description: String,
}

impl ContextDef {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Arguments of `CapabilityRegistry::register_cap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityDef {
    pub label: String,
    pub description: String,
    pub context: String,
    pub dependency: Option<String>,
}

impl CapabilityDef {
    pub fn new(context: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            context: context.into(),
            dependency: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }
}

/// Slugs are non-empty and made of ASCII letters, digits, `_` or `-`.
///
/// `:` is excluded because grant keys are encoded as `role:capability`.
pub(crate) fn validate_slug(slug: &str) -> Result<(), CapabilityError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CapabilityError::InvalidSlug(slug.to_string()))
    }
}
