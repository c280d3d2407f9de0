//! Local Directory Metadata Store
//!
//! Persists each key as one file under a root directory. A file holds a
//! one-line JSON header (key and version) followed by the raw value bytes.
//! Writes go to a temporary file that is renamed into place, so readers
//! always observe a complete record.

use crate::domain::ports::{KvPair, MetadataStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "kv";

/// Header line stored in front of every value
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    key: String,
    version: u64,
}

/// Metadata store persisted in a local directory
pub struct LocalStore {
    root_path: PathBuf,
    /// Serializes writers so check-and-set is atomic within the process
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root_path`
    pub async fn open(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root_path).await?;
        debug!(root = %root_path.display(), "opened local metadata store");
        Ok(Self {
            root_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root_path
            .join(format!("{}.{}", urlencoding::encode(key), RECORD_EXTENSION))
    }

    async fn read_record(path: &Path) -> Result<Option<KvPair>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(&raw).map(Some)
    }

    async fn write_record(&self, pair: &KvPair) -> Result<()> {
        let path = self.record_path(&pair.key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, encode(pair)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn encode(pair: &KvPair) -> Result<Vec<u8>> {
    let header = RecordHeader {
        key: pair.key.clone(),
        version: pair.version,
    };
    let mut out = serde_json::to_vec(&header)?;
    out.push(b'\n');
    out.extend_from_slice(&pair.value);
    Ok(out)
}

fn decode(raw: &[u8]) -> Result<KvPair> {
    let split = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| Error::Store("record is missing its header line".into()))?;
    let header: RecordHeader = serde_json::from_slice(&raw[..split])?;
    Ok(KvPair {
        key: header.key,
        value: Bytes::copy_from_slice(&raw[split + 1..]),
        version: header.version,
    })
}

#[async_trait]
impl MetadataStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<KvPair>> {
        Self::read_record(&self.record_path(key)).await
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<KvPair> {
        let _guard = self.write_lock.lock().await;
        if Self::read_record(&self.record_path(key)).await?.is_some() {
            return Err(Error::RecordExists {
                key: key.to_string(),
            });
        }
        let pair = KvPair {
            key: key.to_string(),
            value,
            version: 1,
        };
        self.write_record(&pair).await?;
        Ok(pair)
    }

    async fn put(&self, key: &str, value: Bytes, expected_version: Option<u64>) -> Result<KvPair> {
        let _guard = self.write_lock.lock().await;
        let found = Self::read_record(&self.record_path(key))
            .await?
            .map(|p| p.version)
            .unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != found {
                return Err(Error::VersionConflict {
                    key: key.to_string(),
                    expected,
                    found,
                });
            }
        }
        let pair = KvPair {
            key: key.to_string(),
            value,
            version: found + 1,
        };
        self.write_record(&pair).await?;
        Ok(pair)
    }

    async fn delete(&self, key: &str) -> Result<Option<KvPair>> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(key);
        let existing = Self::read_record(&path).await?;
        if existing.is_some() {
            fs::remove_file(&path).await?;
        }
        Ok(existing)
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let mut dir = fs::read_dir(&self.root_path).await?;
        let mut pairs = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(pair)) if pair.key.starts_with(prefix) => pairs.push(pair),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }

        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(pairs)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    async fn test_store() -> (LocalStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path()).await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let (store, _tmp) = test_store().await;

        store
            .create("volumes/vfs/a", Bytes::from_static(b"{\"x\":1}\nline two"))
            .await
            .unwrap();

        let got = store.get("volumes/vfs/a").await.unwrap().unwrap();
        assert_eq!(got.version, 1);
        assert_eq!(got.value.as_ref(), b"{\"x\":1}\nline two");

        assert_matches!(
            store.create("volumes/vfs/a", Bytes::new()).await,
            Err(Error::RecordExists { .. })
        );

        assert!(store.delete("volumes/vfs/a").await.unwrap().is_some());
        assert!(store.get("volumes/vfs/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_check() {
        let (store, _tmp) = test_store().await;
        store.create("k", Bytes::from_static(b"a")).await.unwrap();
        store.put("k", Bytes::from_static(b"b"), Some(1)).await.unwrap();

        assert_matches!(
            store.put("k", Bytes::from_static(b"c"), Some(1)).await,
            Err(Error::VersionConflict { found: 2, .. })
        );
        assert_eq!(store.get("k").await.unwrap().unwrap().value.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_persistence() {
        let tmp = TempDir::new().unwrap();

        {
            let store = LocalStore::open(tmp.path()).await.unwrap();
            store
                .create("volumes/vfs/keep", Bytes::from_static(b"data"))
                .await
                .unwrap();
            store
                .create("volumes/fake/other", Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        {
            let store = LocalStore::open(tmp.path()).await.unwrap();
            let pairs = store.enumerate("volumes/vfs/").await.unwrap();
            assert_eq!(pairs.len(), 1);
            assert_eq!(pairs[0].key, "volumes/vfs/keep");
            assert_eq!(pairs[0].value.as_ref(), b"data");
        }
    }
}
