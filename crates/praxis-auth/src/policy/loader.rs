//! Resource loading.
//!
//! The evaluator never reads domain records itself. It asks a
//! [`ResourceLoader`] for the authorization-relevant view of an instance.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;
use crate::rbac::ResourceType;
use crate::types::ResourceInstance;

/// Resolves resource instances by type and id.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Loads an instance. `Ok(None)` means the instance does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn load(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> AuthResult<Option<ResourceInstance>>;
}

/// Loader over a fixed in-memory set of instances.
#[derive(Debug, Default)]
pub struct InMemoryResourceLoader {
    resources: DashMap<(ResourceType, String), ResourceInstance>,
}

impl InMemoryResourceLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an instance.
    pub fn insert(&self, instance: ResourceInstance) {
        self.resources
            .insert((instance.resource_type, instance.id.clone()), instance);
    }

    /// Number of stored instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl FromIterator<ResourceInstance> for InMemoryResourceLoader {
    fn from_iter<I: IntoIterator<Item = ResourceInstance>>(iter: I) -> Self {
        let loader = Self::new();
        for instance in iter {
            loader.insert(instance);
        }
        loader
    }
}

#[async_trait]
impl ResourceLoader for InMemoryResourceLoader {
    async fn load(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> AuthResult<Option<ResourceInstance>> {
        Ok(self
            .resources
            .get(&(resource_type, id.to_string()))
            .map(|entry| entry.value().clone()))
    }
}
