pub mod disk;
pub mod mem;

pub use disk::{open_db, DiskStore};
pub use mem::MemStore;

use anyhow::Result;
use async_trait::async_trait;

/// Uniform keyed CRUD over one collection of typed resource records.
///
/// Both persistence backends and the HTTP client implement this, so every
/// control loop is written once against the trait and wired to either an
/// in-process store or the API server.
#[async_trait]
pub trait Store<T>: Send + Sync {
    /// Snapshot of all records; order unspecified. Callers may iterate
    /// without holding any internal lock.
    async fn list(&self) -> Result<Vec<T>>;

    /// `Ok(None)` for a missing key — absence is not an error.
    async fn get(&self, name: &str) -> Result<Option<T>>;

    /// Upsert by name.
    async fn put(&self, name: &str, value: T) -> Result<()>;

    /// Idempotent; deleting a missing key is a no-op.
    async fn delete(&self, name: &str) -> Result<()>;
}
