//! In-Memory Metadata Store
//!
//! Process-local store backed by DashMap. Records do not survive a restart;
//! used for tests and single-shot deployments.

use crate::domain::ports::{KvPair, MetadataStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Metadata store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, KvPair>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<KvPair>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<KvPair> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(Error::RecordExists {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                let pair = KvPair {
                    key: key.to_string(),
                    value,
                    version: 1,
                };
                slot.insert(pair.clone());
                Ok(pair)
            }
        }
    }

    async fn put(&self, key: &str, value: Bytes, expected_version: Option<u64>) -> Result<KvPair> {
        // The entry guard holds the shard lock, so check-and-set is atomic.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let found = slot.get().version;
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
                slot.insert(pair.clone());
                Ok(pair)
            }
            Entry::Vacant(slot) => {
                if let Some(expected) = expected_version {
                    if expected != 0 {
                        return Err(Error::VersionConflict {
                            key: key.to_string(),
                            expected,
                            found: 0,
                        });
                    }
                }
                let pair = KvPair {
                    key: key.to_string(),
                    value,
                    version: 1,
                };
                slot.insert(pair.clone());
                Ok(pair)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<Option<KvPair>> {
        Ok(self.entries.remove(key).map(|(_, pair)| pair))
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let mut pairs: Vec<KvPair> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.value().clone())
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(pairs)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
