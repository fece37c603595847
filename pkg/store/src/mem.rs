use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::Store;

/// In-memory backend. Reads proceed in parallel, writes serialize per
/// collection; `list` clones a snapshot out from under the lock.
pub struct MemStore<T> {
    items: RwLock<HashMap<String, T>>,
}

impl<T> MemStore<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Store<T> for MemStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<T>> {
        let items = self
            .items
            .read()
            .map_err(|_| anyhow!("mem store lock poisoned"))?;
        Ok(items.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Option<T>> {
        let items = self
            .items
            .read()
            .map_err(|_| anyhow!("mem store lock poisoned"))?;
        Ok(items.get(name).cloned())
    }

    async fn put(&self, name: &str, value: T) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow!("mem store lock poisoned"))?;
        items.insert(name.to_string(), value);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow!("mem store lock poisoned"))?;
        items.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = MemStore::new();
        store.put("a", 1u32).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_is_upsert() {
        let store = MemStore::new();
        store.put("a", 1u32).await.unwrap();
        store.put("a", 2u32).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(2));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemStore::new();
        store.put("a", 1u32).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_a_snapshot() {
        let store = MemStore::new();
        store.put("a", 1u32).await.unwrap();
        store.put("b", 2u32).await.unwrap();
        let snapshot = store.list().await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
