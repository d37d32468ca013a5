//! File-change notifications flowing from the reload server's watcher into
//! the update resolution pipeline.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File was created
    Add,
    /// File was modified
    Change,
    /// File was removed
    Unlink,
}

impl ChangeKind {
    /// Event name used when the change is re-published on the event bus.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        }
    }
}

/// Filesystem metadata snapshot attached to a change notification.
///
/// A plain-data projection of [`std::fs::Metadata`] so descriptors stay
/// cheaply cloneable as they fan out through the resolver chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    /// File size in bytes at notification time.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
}

impl From<&Metadata> for FileStats {
    fn from(meta: &Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

/// One detected filesystem change.
///
/// Immutable; one instance per notification. Descriptors are passed by value
/// through the pipeline and are not retained past its completion.
#[derive(Debug, Clone)]
pub struct ChangeDescriptor {
    /// Path of the changed file.
    pub file: PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
    /// Metadata snapshot, when available (absent for `Unlink`).
    pub stats: Option<FileStats>,
}

impl ChangeDescriptor {
    /// Create a descriptor without metadata.
    pub fn new(kind: ChangeKind, file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            kind,
            stats: None,
        }
    }

    /// Attach a metadata snapshot.
    pub fn with_stats(mut self, stats: FileStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        &self.file
    }
}
