use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use slatedb::Db;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, warn};

use crate::Store;

/// Open (or create) the shared database rooted at `path` on the local
/// filesystem. One database per API server process; each resource kind
/// gets its own bucket via [`DiskStore`].
pub async fn open_db(path: &str) -> Result<Arc<Db>> {
    info!("Opening state database at {}", path);

    std::fs::create_dir_all(path)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

    let object_store = Arc::new(
        LocalFileSystem::new_with_prefix(path)
            .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
    );
    let db = Db::open(Path::from("/"), object_store)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    Ok(Arc::new(db))
}

/// Gracefully close the shared database.
pub async fn close_db(db: Arc<Db>) -> Result<()> {
    db.close()
        .await
        .map_err(|e| anyhow::anyhow!("Database close failed: {}", e))
}

/// Disk-backed store: one named bucket of the shared database, values
/// JSON-encoded and keyed by resource name. Survives process restart.
pub struct DiskStore<T> {
    db: Arc<Db>,
    bucket: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DiskStore<T> {
    pub fn new(db: Arc<Db>, bucket: impl Into<String>) -> Self {
        Self {
            db,
            bucket: bucket.into(),
            _marker: PhantomData,
        }
    }

    fn key(&self, name: &str) -> String {
        format!("/{}/{}", self.bucket, name)
    }

    fn prefix(&self) -> String {
        format!("/{}/", self.bucket)
    }
}

/// Compute a `[start, end)` byte-range covering every key with the given
/// prefix. Returns `None` for the upper bound when the prefix is all
/// `0xFF` bytes (i.e. the range is unbounded above).
fn prefix_range(prefix: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
    let start = prefix.to_vec();
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last == 0xFF {
            end.pop();
        } else {
            *end.last_mut().unwrap() += 1;
            return (start, Some(end));
        }
    }
    (start, None)
}

#[async_trait]
impl<T> Store<T> for DiskStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<T>> {
        let prefix = self.prefix();
        let (start, end) = prefix_range(prefix.as_bytes());
        let mut iter = match end {
            Some(end) => self.db.scan(start..end).await,
            None => self.db.scan(start..).await,
        }
        .map_err(|e| anyhow::anyhow!("scan of bucket {} failed: {}", self.bucket, e))?;

        let mut out = Vec::new();
        while let Ok(Some(kv)) = iter.next().await {
            match serde_json::from_slice(&kv.value) {
                Ok(item) => out.push(item),
                Err(e) => {
                    let key = String::from_utf8_lossy(&kv.key).to_string();
                    warn!("Skipping undecodable record {}: {}", key, e);
                }
            }
        }
        Ok(out)
    }

    async fn get(&self, name: &str) -> Result<Option<T>> {
        match self.db.get(self.key(name).as_bytes()).await {
            Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "get {}/{} failed: {}",
                self.bucket,
                name,
                e
            )),
        }
    }

    async fn put(&self, name: &str, value: T) -> Result<()> {
        let data = serde_json::to_vec(&value)?;
        self.db
            .put(self.key(name).as_bytes(), &data)
            .await
            .map_err(|e| anyhow::anyhow!("put {}/{} failed: {}", self.bucket, name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.db
            .delete(self.key(name).as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("delete {}/{} failed: {}", self.bucket, name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        value: u32,
    }

    fn record(name: &str, value: u32) -> Record {
        Record {
            name: name.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path().to_str().unwrap()).await.unwrap();
        let store: DiskStore<Record> = DiskStore::new(db, "records");

        assert_eq!(store.get("a").await.unwrap(), None);

        store.put("a", record("a", 1)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(record("a", 1)));

        store.put("a", record("a", 2)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(record("a", 2)));
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path().to_str().unwrap()).await.unwrap();
        let pods: DiskStore<Record> = DiskStore::new(db.clone(), "pods");
        let nodes: DiskStore<Record> = DiskStore::new(db, "nodes");

        pods.put("shared-name", record("pod", 1)).await.unwrap();
        nodes.put("shared-name", record("node", 2)).await.unwrap();

        assert_eq!(pods.get("shared-name").await.unwrap(), Some(record("pod", 1)));
        assert_eq!(
            nodes.get("shared-name").await.unwrap(),
            Some(record("node", 2))
        );
        assert_eq!(pods.list().await.unwrap().len(), 1);

        nodes.delete("shared-name").await.unwrap();
        assert_eq!(pods.get("shared-name").await.unwrap(), Some(record("pod", 1)));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        let db = open_db(path).await.unwrap();
        let store: DiskStore<Record> = DiskStore::new(db.clone(), "records");
        store.put("a", record("a", 7)).await.unwrap();
        close_db(db).await.unwrap();

        let db = open_db(path).await.unwrap();
        let store: DiskStore<Record> = DiskStore::new(db, "records");
        assert_eq!(store.get("a").await.unwrap(), Some(record("a", 7)));
    }
}
