//! Path normalization.
//!
//! Maps a raw path from the watcher, a webhook or a manual request onto a
//! canonical path under the longest matching watched root.

use omniscan_common::{Error, EventSource, Result};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::config::RootConfig;

/// An enabled watched root, canonicalized when the normalizer is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedRoot {
    /// Canonical path used for matching and scanning
    pub path: PathBuf,
    /// Path as configured, when it differs from the canonical one
    pub configured: PathBuf,
    pub recursive: bool,
}

/// A path mapped onto a watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPath {
    pub root: PathBuf,
    pub path: PathBuf,
    /// `path` relative to `root`; empty for the root itself
    pub relative: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PathNormalizer {
    roots: Vec<WatchedRoot>,
}

impl PathNormalizer {
    /// Build from configured roots. Disabled roots are left out.
    pub fn new<'a>(roots: impl IntoIterator<Item = &'a RootConfig>) -> Result<Self> {
        let mut watched = Vec::new();
        for root in roots.into_iter().filter(|r| r.enabled) {
            let lexical = lexical_clean(&root.path)?;
            let path = resolve(&lexical).unwrap_or_else(|_| lexical.clone());
            watched.push(WatchedRoot {
                path,
                configured: lexical,
                recursive: root.recursive,
            });
        }
        Ok(Self { roots: watched })
    }

    pub fn roots(&self) -> &[WatchedRoot] {
        &self.roots
    }

    /// The root a canonical path belongs to.
    pub fn root_for(&self, path: &Path) -> Option<&WatchedRoot> {
        self.roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
    }

    /// Normalize a raw path.
    pub fn normalize(&self, raw: &str, source: EventSource) -> Result<CanonicalPath> {
        if raw.is_empty() {
            return Err(Error::invalid_path(raw, "empty path"));
        }
        if raw.contains('\0') {
            return Err(Error::invalid_path(raw.replace('\0', "\\0"), "contains NUL byte"));
        }
        self.normalize_path(Path::new(raw)).map_err(|e| {
            if let Error::OutOfScope(ref p) = e {
                tracing::debug!(path = %p.display(), ?source, "path outside watched roots");
            }
            e
        })
    }

    pub fn normalize_path(&self, raw: &Path) -> Result<CanonicalPath> {
        if !raw.is_absolute() {
            return Err(Error::invalid_path(raw.to_string_lossy(), "path is not absolute"));
        }

        let lexical = lexical_clean(raw)?;
        let resolved = resolve(&lexical)?;

        // Resolved path first, then the lexical one for roots configured
        // through a symlink
        if let Some(canonical) = self.map_onto_root(&resolved) {
            return Ok(canonical);
        }
        if let Some(canonical) = self.map_lexical(&lexical) {
            return Ok(canonical);
        }

        Err(Error::OutOfScope(resolved))
    }

    fn map_onto_root(&self, path: &Path) -> Option<CanonicalPath> {
        let root = self.root_for(path)?;
        let relative = path.strip_prefix(&root.path).ok()?.to_path_buf();
        Some(CanonicalPath {
            root: root.path.clone(),
            path: path.to_path_buf(),
            relative,
        })
    }

    fn map_lexical(&self, path: &Path) -> Option<CanonicalPath> {
        let root = self
            .roots
            .iter()
            .filter(|r| path.starts_with(&r.configured))
            .max_by_key(|r| r.configured.components().count())?;
        let relative = path.strip_prefix(&root.configured).ok()?.to_path_buf();
        Some(CanonicalPath {
            root: root.path.clone(),
            path: root.path.join(&relative),
            relative,
        })
    }
}

/// Drop `.` components, resolve `..` lexically, strip trailing separators.
pub fn lexical_clean(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(Error::invalid_path(
                        path.to_string_lossy(),
                        "'..' escapes the filesystem root",
                    ));
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    Ok(out)
}

/// Canonicalize an existing path, or the deepest existing ancestor of a
/// missing one with the remaining components re-appended.
fn resolve(path: &Path) -> Result<PathBuf> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            return std::fs::canonicalize(path).map_err(|e| {
                if meta.file_type().is_symlink() {
                    Error::invalid_path(path.to_string_lossy(), "dangling symlink")
                } else {
                    Error::invalid_path(path.to_string_lossy(), e.to_string())
                }
            });
        }
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            return Err(Error::invalid_path(path.to_string_lossy(), e.to_string()));
        }
        Err(_) => {}
    }

    let mut tail: Vec<&OsStr> = Vec::new();
    let mut ancestor = path;
    loop {
        match ancestor.parent() {
            Some(parent) => {
                if let Some(name) = ancestor.file_name() {
                    tail.push(name);
                }
                ancestor = parent;
                if let Ok(mut base) = std::fs::canonicalize(ancestor) {
                    for name in tail.iter().rev() {
                        base.push(name);
                    }
                    return Ok(base);
                }
            }
            None => return Ok(path.to_path_buf()),
        }
    }
}
