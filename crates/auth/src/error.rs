use thiserror::Error;

/// Failures of the capability engine.
///
/// Every variant except `Storage` leaves the registry and the host role
/// storage unchanged. A `Storage` failure part way through a bulk revoke or
/// grant can leave the roles handled before it already changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("invalid slug '{0}'")]
    InvalidSlug(String),

    #[error("context '{0}' is not registered")]
    UnknownContext(String),

    #[error("capability '{0}' is not registered")]
    UnknownCapability(String),

    #[error("role '{0}' is not known to the host")]
    UnknownRole(String),

    #[error("capability '{capability}' depends on unregistered capability '{dependency}'")]
    UnknownDependency {
        capability: String,
        dependency: String,
    },

    #[error(
        "capability '{capability}' (context '{context}') cannot depend on '{dependency}' (context '{dependency_context}')"
    )]
    ContextMismatch {
        capability: String,
        context: String,
        dependency: String,
        dependency_context: String,
    },

    #[error("capability '{capability}' would close a dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle {
        capability: String,
        chain: Vec<String>,
    },

    #[error("capability '{capability}' cannot move to context '{context}': '{dependent}' depends on it")]
    DependentInOtherContext {
        capability: String,
        context: String,
        dependent: String,
    },

    #[error("malformed grant key '{0}' (expected 'role:capability')")]
    MalformedGrantKey(String),

    #[error("role storage failed: {0}")]
    Storage(String),
}
