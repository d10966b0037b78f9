//! Persisted allowlist store.
//!
//! The store is the engine's only shared mutable resource. Writers go
//! through [`AllowlistStore`], a narrow `load` / `append` / `touch`
//! interface, so tests can inject an in-memory implementation.
//! [`JsonFileStore`] keeps a per-agent JSON document and enforces a
//! single-writer discipline: an internal mutex serializes writers, every
//! write is a read-merge-write, and the document is written to a
//! temporary file and renamed into place so a crash never truncates it.
//! Lost `usage_count` / `last_used_at` updates are tolerable (best-effort
//! audit); lost entry additions are not.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use execgate_types::{AllowlistEntry, StoreError};

/// Narrow interface over the persisted allowlist.
pub trait AllowlistStore: Send + Sync {
    /// Read every entry, in document order.
    fn load(&self) -> Result<Vec<AllowlistEntry>, StoreError>;

    /// Add entries whose patterns are not already present.
    /// Returns how many were actually added.
    fn append(&self, entries: &[AllowlistEntry]) -> Result<usize, StoreError>;

    /// Record a successful match against the given patterns: bump
    /// `usage_count` and stamp `last_used_at`. Unknown patterns are
    /// ignored; this never creates entries.
    fn touch(&self, patterns: &[String]) -> Result<(), StoreError>;
}

// ── JSON file store ─────────────────────────────────────────────────────

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AllowlistDocument {
    #[serde(default)]
    entries: Vec<AllowlistEntry>,
}

/// File-backed store with atomic writes.
pub struct JsonFileStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`. The file and its parent directories are
    /// created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    /// The document's location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<AllowlistDocument, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(AllowlistDocument::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write-temp-then-rename in the same directory, so the swap is
    /// atomic on the same filesystem.
    fn write_document(&self, document: &AllowlistDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self
            .path
            .with_extension(format!("tmp.{}", std::process::id()));
        let bytes = serde_json::to_vec_pretty(document)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl AllowlistStore for JsonFileStore {
    fn load(&self) -> Result<Vec<AllowlistEntry>, StoreError> {
        Ok(self.read_document()?.entries)
    }

    fn append(&self, entries: &[AllowlistEntry]) -> Result<usize, StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let mut document = self.read_document()?;
        let existing: HashSet<String> =
            document.entries.iter().map(|e| e.pattern.clone()).collect();

        let mut added = 0;
        for entry in entries {
            if existing.contains(&entry.pattern) {
                continue;
            }
            document.entries.push(entry.clone());
            added += 1;
        }
        if added > 0 {
            self.write_document(&document)?;
            debug!(path = %self.path.display(), added, "persisted allowlist entries");
        }
        Ok(added)
    }

    fn touch(&self, patterns: &[String]) -> Result<(), StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let mut document = self.read_document()?;
        let now = Utc::now();
        let mut touched = false;
        for entry in &mut document.entries {
            if patterns.contains(&entry.pattern) {
                entry.last_used_at = Some(now);
                entry.usage_count += 1;
                touched = true;
            }
        }
        if touched {
            self.write_document(&document)?;
        }
        Ok(())
    }
}

// ── In-memory store ─────────────────────────────────────────────────────

/// Test double keeping entries in memory behind the same interface.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<AllowlistEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing entries.
    pub fn with_entries(entries: Vec<AllowlistEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl AllowlistStore for MemoryStore {
    fn load(&self) -> Result<Vec<AllowlistEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }

    fn append(&self, entries: &[AllowlistEntry]) -> Result<usize, StoreError> {
        let mut stored = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut added = 0;
        for entry in entries {
            if stored.iter().any(|e| e.pattern == entry.pattern) {
                continue;
            }
            stored.push(entry.clone());
            added += 1;
        }
        Ok(added)
    }

    fn touch(&self, patterns: &[String]) -> Result<(), StoreError> {
        let mut stored = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();
        for entry in stored.iter_mut() {
            if patterns.contains(&entry.pattern) {
                entry.last_used_at = Some(now);
                entry.usage_count += 1;
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
