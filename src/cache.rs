//! Per-project index cache for incremental runs.
//!
//! Records each file's content hash, its emitted chunk ids, and per-chunk
//! content hashes so unchanged files are skipped wholesale and unchanged
//! chunks within a changed file are not re-embedded. One JSON file per
//! project, written atomically via temp file + rename.

use crate::error::CacheError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Cached state for one indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 of the file bytes
    pub content_hash: String,

    /// File modification time at indexing
    pub mod_time: DateTime<Utc>,

    /// When the file was last indexed
    pub indexed_at: DateTime<Utc>,

    /// Chunk ids emitted for this file, in source order
    pub chunk_ids: Vec<String>,

    /// Per-chunk content hashes, keyed by chunk id
    #[serde(default)]
    pub chunk_hashes: HashMap<String, String>,
}

/// On-disk JSON structure.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    project_id: String,
    updated_at: DateTime<Utc>,
    files: HashMap<String, CacheEntry>,
}

/// File-hash cache for a single project.
#[derive(Debug)]
pub struct IndexCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl IndexCache {
    /// Open (or create) the cache for a project under `cache_dir`.
    pub fn open(cache_dir: &Path, project_id: &str) -> Result<Self> {
        let path = cache_dir.join(format!("{project_id}.json"));

        let mut cache = Self {
            path,
            entries: HashMap::new(),
            dirty: false,
        };
        cache.load()?;
        Ok(cache)
    }

    fn load(&mut self) -> Result<()> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cache file, starting empty");
                return Ok(());
            }
            Err(e) => {
                return Err(CacheError::LoadFailed {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        };

        let file: CacheFile =
            serde_json::from_str(&data).map_err(|e| CacheError::LoadFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.entries = file.files;
        tracing::debug!(files = self.entries.len(), "loaded index cache");
        Ok(())
    }

    /// Write the cache to disk atomically. A cache that was not mutated
    /// since loading is not rewritten.
    pub fn save(&mut self, project_id: &str) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let file = CacheFile {
            project_id: project_id.to_string(),
            updated_at: Utc::now(),
            files: self.entries.clone(),
        };

        let data = serde_json::to_vec_pretty(&file).map_err(|e| CacheError::SaveFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::SaveFailed {
                path: self.path.display().to_string(),
                reason: format!("create cache directory: {e}"),
            })?;
        }

        // Readers observe either the old or the new file, never a torn one.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &data).map_err(|e| CacheError::SaveFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::SaveFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        self.dirty = false;
        tracing::debug!(path = %self.path.display(), "saved index cache");
        Ok(())
    }

    pub fn get(&self, file_path: &str) -> Option<&CacheEntry> {
        self.entries.get(file_path)
    }

    pub fn set(&mut self, file_path: String, entry: CacheEntry) {
        self.entries.insert(file_path, entry);
        self.dirty = true;
    }

    pub fn delete(&mut self, file_path: &str) {
        self.entries.remove(file_path);
        self.dirty = true;
    }

    /// Whether a file needs reindexing: unknown path or different hash.
    pub fn has_changed(&self, file_path: &str, content_hash: &str) -> bool {
        match self.entries.get(file_path) {
            None => true,
            Some(entry) => entry.content_hash != content_hash,
        }
    }

    /// All cached file paths.
    pub fn files(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Chunk ids most recently emitted for a file.
    pub fn chunk_ids(&self, file_path: &str) -> Vec<String> {
        self.entries
            .get(file_path)
            .map(|e| e.chunk_ids.clone())
            .unwrap_or_default()
    }

    /// Per-chunk content hashes for a file.
    pub fn chunk_hashes(&self, file_path: &str) -> HashMap<String, String> {
        self.entries
            .get(file_path)
            .map(|e| e.chunk_hashes.clone())
            .unwrap_or_default()
    }

    /// Replace a file's chunk-hash map.
    pub fn set_chunk_hashes(&mut self, file_path: &str, hashes: HashMap<String, String>) {
        if let Some(entry) = self.entries.get_mut(file_path) {
            entry.chunk_hashes = hashes;
            self.dirty = true;
        }
    }

    /// Drop every entry. Used by full reindex.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            file_count: self.entries.len(),
            chunk_count: self.entries.values().map(|e| e.chunk_ids.len()).sum(),
        }
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub file_count: usize,
    pub chunk_count: usize,
}
