//! Document repository
//!
//! Workflow documents are stored whole and replaced whole. Every replace is
//! guarded by the document's `version`: a stale write fails with
//! [`Error::Conflict`](crate::Error::Conflict) instead of silently
//! overwriting a concurrent transition.
//!
//! Backends:
//! - [`MemoryStore`]: process-local, for tests and dry runs
//! - [`SqliteStore`]: JSON documents in SQLite via sqlx

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// A storable workflow document
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (table namespace) the document lives in
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);

    /// Secondary key that must be unique within the collection
    fn unique_key(&self) -> Option<String> {
        None
    }
}

/// Create / fetch / full-replace storage for one document type
#[async_trait]
pub trait Repository<D: Document>: Send + Sync {
    /// Insert a new document. Fails with `Conflict` if the id or unique key
    /// is already taken.
    async fn create(&self, doc: &D) -> Result<()>;

    /// Fetch by id
    async fn get(&self, id: &str) -> Result<Option<D>>;

    /// Replace the stored document if its version still matches, then bump
    /// the version on both copies.
    async fn replace(&self, doc: &mut D) -> Result<()>;

    /// Fetch by unique key
    async fn find_by_key(&self, key: &str) -> Result<Option<D>>;

    /// Every document of the collection
    async fn list(&self) -> Result<Vec<D>>;
}
