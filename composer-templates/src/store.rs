//! Template definition lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use composer_primitives::TemplateKey;
use tokio::sync::RwLock;
use tracing::debug;

use crate::definition::TemplateDefinition;
use crate::error::TemplateResult;

/// Source of template definitions keyed by `(bundle_id, slug, version)`.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Fetches a definition. `Ok(None)` means the key is unknown.
    async fn fetch(&self, key: &TemplateKey) -> TemplateResult<Option<TemplateDefinition>>;
}

/// Store holding definitions in memory.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    inner: RwLock<HashMap<TemplateKey, TemplateDefinition>>,
}

impl InMemoryTemplateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a definition after validating it.
    ///
    /// # Errors
    ///
    /// Propagates [`TemplateDefinition::validate`] failures.
    pub async fn insert(
        &self,
        key: TemplateKey,
        definition: TemplateDefinition,
    ) -> TemplateResult<()> {
        definition.validate()?;
        debug!(template = %key, "template definition stored");
        self.inner.write().await.insert(key, definition);
        Ok(())
    }

    /// Returns the number of stored definitions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns `true` when the store holds no definitions.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn fetch(&self, key: &TemplateKey) -> TemplateResult<Option<TemplateDefinition>> {
        Ok(self.inner.read().await.get(key).cloned())
    }
}
