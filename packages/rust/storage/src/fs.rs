//! Filesystem artifact store: one plain text file per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eascope_shared::{EascopeError, Result, RunId};
use tracing::debug;

use crate::{ArtifactStore, check_key};

/// Artifact store rooted at a directory.
///
/// Writes go to a hidden temp file first and are renamed into place, so a
/// concurrent reader sees either the previous blob or the new one, never a
/// partial write.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// The run-scoped namespace `<output_root>/<run_id>/`.
    ///
    /// Nothing is created until the first write, so a run rejected before
    /// any stage executes leaves no directory behind.
    pub fn for_run(output_root: &Path, run_id: &RunId) -> Self {
        Self {
            root: output_root.join(run_id.to_string()),
        }
    }

    /// Directory holding this store's files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path a key is materialized at.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

impl ArtifactStore for FsStore {
    fn put(&self, key: &str, content: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.root).map_err(|e| EascopeError::io(&self.root, e))?;
        let tmp = self
            .root
            .join(format!(".{key}.{}.tmp", std::process::id()));

        std::fs::write(&tmp, content).map_err(|e| EascopeError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            EascopeError::io(&path, e)
        })?;

        debug!(key, bytes = content.len(), path = %path.display(), "artifact written");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EascopeError::not_found(key)),
            Err(e) => Err(EascopeError::io(&path, e)),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EascopeError::io(&self.root, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EascopeError::io(&self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_file && !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
