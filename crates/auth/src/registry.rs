//! Registry of capability contexts and capabilities.
//!
//! The registry is an ordinary value: build it once per process (or per
//! request) and hand it to whatever needs to answer capability questions.
//! The dependency relation is kept acyclic and context-local at all times.

use std::collections::BTreeMap;

use crate::capability::{validate_slug, Capability, CapabilityContext, CapabilityDef, ContextDef};
use crate::error::CapabilityError;

#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    contexts: BTreeMap<String, CapabilityContext>,
    caps: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a context.
    pub fn register_context(
        &mut self,
        slug: impl Into<String>,
        def: ContextDef,
    ) -> Result<(), CapabilityError> {
        let slug = slug.into();
        validate_slug(&slug).inspect_err(|e| tracing::warn!(error = %e, "context rejected"))?;

        self.contexts.insert(
            slug.clone(),
            CapabilityContext {
                slug,
                label: def.label,
                description: def.description,
            },
        );
        Ok(())
    }

    /// Insert or overwrite a capability.
    ///
    /// Rejected (registry unchanged) when:
    /// - the context is not registered;
    /// - the dependency is not registered or lives in another context;
    /// - the dependency edge would close a cycle;
    /// - re-registration moves a capability out of the context of a
    ///   capability that depends on it.
    pub fn register_cap(
        &mut self,
        slug: impl Into<String>,
        def: CapabilityDef,
    ) -> Result<(), CapabilityError> {
        let slug = slug.into();
        self.check_cap(&slug, &def).inspect_err(|e| {
            tracing::warn!(capability = %slug, error = %e, "capability rejected");
        })?;

        self.caps.insert(
            slug.clone(),
            Capability {
                slug,
                label: def.label,
                description: def.description,
                context: def.context,
                dependency: def.dependency,
            },
        );
        Ok(())
    }

    fn check_cap(&self, slug: &str, def: &CapabilityDef) -> Result<(), CapabilityError> {
        validate_slug(slug)?;

        if !self.exists_context(&def.context) {
            return Err(CapabilityError::UnknownContext(def.context.clone()));
        }

        if let Some(dependency) = &def.dependency {
            let dep = self
                .caps
                .get(dependency)
                .ok_or_else(|| CapabilityError::UnknownDependency {
                    capability: slug.to_string(),
                    dependency: dependency.clone(),
                })?;

            if dep.context != def.context {
                return Err(CapabilityError::ContextMismatch {
                    capability: slug.to_string(),
                    context: def.context.clone(),
                    dependency: dependency.clone(),
                    dependency_context: dep.context.clone(),
                });
            }

            // Walk up from the dependency; reaching `slug` means the new edge
            // closes a loop. The existing graph is acyclic, so the walk ends.
            let mut chain = vec![slug.to_string()];
            let mut cursor = Some(dependency.as_str());
            while let Some(current) = cursor {
                chain.push(current.to_string());
                if current == slug {
                    return Err(CapabilityError::DependencyCycle {
                        capability: slug.to_string(),
                        chain,
                    });
                }
                cursor = self.caps.get(current).and_then(|c| c.dependency.as_deref());
            }
        }

        if let Some(existing) = self.caps.get(slug) {
            if existing.context != def.context {
                if let Some(dependent) = self
                    .caps
                    .values()
                    .find(|c| c.dependency.as_deref() == Some(slug))
                {
                    return Err(CapabilityError::DependentInOtherContext {
                        capability: slug.to_string(),
                        context: def.context.clone(),
                        dependent: dependent.slug.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn exists_context(&self, slug: &str) -> bool {
        self.contexts.contains_key(slug)
    }

    pub fn exists_cap(&self, slug: &str) -> bool {
        self.caps.contains_key(slug)
    }

    pub fn context(&self, slug: &str) -> Option<&CapabilityContext> {
        self.contexts.get(slug)
    }

    pub fn capability(&self, slug: &str) -> Option<&Capability> {
        self.caps.get(slug)
    }

    /// All contexts, ordered by slug.
    pub fn contexts(&self) -> impl Iterator<Item = &CapabilityContext> {
        self.contexts.values()
    }

    /// All capabilities, ordered by slug.
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.caps.values()
    }

    /// Slugs of the capabilities registered in `context`, ordered by slug.
    pub fn get_caps_by_context(&self, context: &str) -> Result<Vec<String>, CapabilityError> {
        if !self.exists_context(context) {
            tracing::warn!(context, "capabilities requested for unregistered context");
            return Err(CapabilityError::UnknownContext(context.to_string()));
        }

        Ok(self
            .caps
            .values()
            .filter(|c| c.context == context)
            .map(|c| c.slug.clone())
            .collect())
    }

    /// The capability followed by its dependency, that dependency's
    /// dependency, and so on up to the root.
    pub fn dependency_chain(&self, slug: &str) -> Result<Vec<String>, CapabilityError> {
        let mut chain = Vec::new();
        let mut cursor = Some(slug);
        while let Some(current) = cursor {
            let cap = self
                .caps
                .get(current)
                .ok_or_else(|| CapabilityError::UnknownCapability(current.to_string()))?;
            chain.push(cap.slug.clone());
            cursor = cap.dependency.as_deref();
        }
        Ok(chain)
    }
}
