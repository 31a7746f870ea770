//! In-memory repository

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Document, Repository};
use crate::{Error, Result};

/// Process-local document store
pub struct MemoryStore<D> {
    docs: RwLock<HashMap<String, D>>,
}

impl<D: Document> MemoryStore<D> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

impl<D: Document> Default for MemoryStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Document> Repository<D> for MemoryStore<D> {
    async fn create(&self, doc: &D) -> Result<()> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(doc.id()) {
            return Err(Error::Conflict {
                id: doc.id().to_string(),
            });
        }
        if let Some(key) = doc.unique_key() {
            if docs.values().any(|d| d.unique_key().as_deref() == Some(key.as_str())) {
                return Err(Error::Conflict { id: key });
            }
        }
        docs.insert(doc.id().to_string(), doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<D>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn replace(&self, doc: &mut D) -> Result<()> {
        let mut docs = self.docs.write().await;
        let stored = docs.get_mut(doc.id()).ok_or_else(|| Error::NotFound {
            kind: D::COLLECTION,
            id: doc.id().to_string(),
        })?;
        if stored.version() != doc.version() {
            return Err(Error::Conflict {
                id: doc.id().to_string(),
            });
        }
        doc.set_version(doc.version() + 1);
        *stored = doc.clone();
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<D>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .find(|d| d.unique_key().as_deref() == Some(key))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<D>> {
        Ok(self.docs.read().await.values().cloned().collect())
    }
}
