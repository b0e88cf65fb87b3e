//! Virtual filesystem mounts for invocation contexts.
//!
//! Sequences never see host paths. A context owns a [`MountTable`]
//! mapping absolute virtual prefixes to filesystem backends; intrinsic
//! code resolves a virtual path to the backend with the longest
//! matching prefix and hands it the remainder. Backends are plain
//! trait objects, so hosts can mount real directories, in-memory
//! trees, or anything else.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// A filesystem backend reachable through a mount.
///
/// Paths handed to a backend are relative to its mount point, with no
/// leading separator.
pub trait VirtualFilesystem: Send + Sync {
    /// Reads the entire file at `path`.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    /// Replaces the file at `path` with `data`.
    fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;
    /// True when `path` names an existing file.
    fn exists(&self, path: &str) -> bool;
}

/// Backend serving a directory of the host filesystem.
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    /// Creates a backend rooted at the given host directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFilesystem { root: root.into() }
    }

    /// Maps a mount-relative path under the root. Parent traversal is
    /// rejected so mounts cannot escape their directory.
    fn resolve_local(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path '{}' escapes its mount", path),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl VirtualFilesystem for LocalFilesystem {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve_local(path)?)
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve_local(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, data)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_local(path)
            .map(|target| target.exists())
            .unwrap_or(false)
    }
}

/// Backend keeping files in a map, for tests and scratch contexts.
#[derive(Default)]
pub struct MemoryFilesystem {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFilesystem {
    /// Creates an empty tree.
    pub fn new() -> Self {
        MemoryFilesystem::default()
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }
}

impl VirtualFilesystem for MemoryFilesystem {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file '{}'", path))
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.files.write().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }
}

/// One entry of a mount table.
#[derive(Clone)]
pub struct Mount {
    /// Normalized absolute prefix, e.g. `/data`.
    pub prefix: String,
    /// Backend serving paths under the prefix.
    pub fs: Arc<dyn VirtualFilesystem>,
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Table of mounts owned by an invocation context.
///
/// Resolution picks the mount with the longest matching prefix; among
/// equal prefixes the most recently added mount wins, so a host can
/// shadow a mount and later remove the shadow.
#[derive(Default)]
pub struct MountTable {
    mounts: RwLock<Vec<Mount>>,
}

impl MountTable {
    /// Creates a table with no mounts.
    pub fn new() -> Self {
        MountTable::default()
    }

    /// Adds a backend under `prefix`. The prefix is normalized to an
    /// absolute path without a trailing separator.
    pub fn mount(&self, prefix: impl Into<String>, fs: Arc<dyn VirtualFilesystem>) {
        let prefix = normalize_prefix(&prefix.into());
        self.mounts.write().push(Mount { prefix, fs });
    }

    /// Removes the most recent mount at `prefix`. Returns false when
    /// no mount uses that prefix.
    pub fn unmount(&self, prefix: &str) -> bool {
        let prefix = normalize_prefix(prefix);
        let mut mounts = self.mounts.write();
        match mounts.iter().rposition(|m| m.prefix == prefix) {
            Some(index) => {
                mounts.remove(index);
                true
            }
            None => false,
        }
    }

    /// Resolves an absolute virtual path to its backend and the
    /// mount-relative remainder.
    pub fn resolve(&self, path: &str) -> Option<(Arc<dyn VirtualFilesystem>, String)> {
        let mounts = self.mounts.read();
        let mut best: Option<&Mount> = None;
        for mount in mounts.iter().rev() {
            if !prefix_matches(&mount.prefix, path) {
                continue;
            }
            // Scanning newest-first, so a strict improvement keeps the
            // newest mount among equal prefixes.
            let better = match best {
                Some(current) => mount.prefix.len() > current.prefix.len(),
                None => true,
            };
            if better {
                best = Some(mount);
            }
        }
        best.map(|m| (Arc::clone(&m.fs), remainder(&m.prefix, path)))
    }

    /// Reads through the table.
    pub fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.resolve(path) {
            Some((fs, rest)) => fs.read(&rest),
            None => Err(no_mount(path)),
        }
    }

    /// Writes through the table.
    pub fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        match self.resolve(path) {
            Some((fs, rest)) => fs.write(&rest, data),
            None => Err(no_mount(path)),
        }
    }

    /// True when some mount serves `path` and the file exists.
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|(fs, rest)| fs.exists(&rest))
            .unwrap_or(false)
    }

    /// Number of active mounts.
    pub fn mount_count(&self) -> usize {
        self.mounts.read().len()
    }

    /// Snapshot of the active mounts, oldest first.
    pub fn mounts(&self) -> Vec<Mount> {
        self.mounts.read().clone()
    }
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<String> = self.mounts.read().iter().map(|m| m.prefix.clone()).collect();
        f.debug_struct("MountTable")
            .field("mounts", &prefixes)
            .finish()
    }
}

fn no_mount(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no mount covers '{}'", path),
    )
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// A prefix only matches on a component boundary: `/data` covers
/// `/data` and `/data/x` but not `/database`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn remainder(prefix: &str, path: &str) -> String {
    let rest = if prefix == "/" {
        path
    } else {
        &path[prefix.len()..]
    };
    rest.trim_start_matches('/').to_string()
}
