//! Key-addressed artifact storage.
//!
//! The [`ArtifactStore`] trait is the only shared mutable resource of a
//! pipeline run. Two backings are provided:
//! - [`MemoryStore`]: one instance per run, nothing touches disk
//! - [`FsStore`]: one file per key under a run-scoped directory
//!
//! **Access rules:**
//! - Reads observe the most recent write from the same process.
//! - `exists` and `get` are not atomic with respect to each other. Callers that
//!   need the content should call [`ArtifactStore::get`] and treat
//!   [`EascopeError::NotFound`] as "absent" instead of checking `exists` first.

mod fs;
mod memory;

use eascope_shared::{EascopeError, Result};

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Key-addressed read/write of text blobs.
pub trait ArtifactStore: Send + Sync {
    /// Store `content` under `key`, replacing any previous value.
    fn put(&self, key: &str, content: &str) -> Result<()>;

    /// Read the content stored under `key`.
    ///
    /// Returns [`EascopeError::NotFound`] when nothing is stored there.
    fn get(&self, key: &str) -> Result<String>;

    /// Whether anything is stored under `key`.
    fn exists(&self, key: &str) -> bool;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Like [`get`](Self::get), but maps a missing key to `None`.
    fn get_opt(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Reject keys that are empty or could escape a namespace.
pub(crate) fn check_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.starts_with('.');

    if bad {
        return Err(EascopeError::validation(format!(
            "invalid artifact key '{key}'"
        )));
    }
    Ok(())
}
