//! In-memory artifact store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use eascope_shared::{EascopeError, Result};

use crate::{ArtifactStore, check_key};

/// Artifact store backed by a map. Create one per run for isolation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> EascopeError {
    EascopeError::Storage("memory store lock poisoned".into())
}

impl ArtifactStore for MemoryStore {
    fn put(&self, key: &str, content: &str) -> Result<()> {
        check_key(key)?;
        let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
        blobs.insert(key.to_string(), content.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| EascopeError::not_found(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(key))
            .unwrap_or(false)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        Ok(blobs.keys().cloned().collect())
    }
}
