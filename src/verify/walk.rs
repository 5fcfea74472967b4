//! Directory enumeration for verification jobs.

use omniscan_common::paths::{has_extension, is_hidden};
use omniscan_common::{Error, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Compiled ignore globs.
///
/// `**` matches across separators, `*` and `?` stay inside one component.
/// A pattern matches when it matches either the full path or the final
/// component, so `*.partial` and `/media/**/Sample/**` both work.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&glob_to_regex(p))
                    .map_err(|e| Error::config(format!("invalid ignore pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let full = path.to_string_lossy();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.patterns
            .iter()
            .any(|re| re.is_match(&full) || re.is_match(&name))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Options for one enumeration.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions<'a> {
    pub recursive: bool,
    pub extensions: &'a [String],
    pub ignore: &'a IgnoreSet,
    pub symlink_check: bool,
}

/// Result of enumerating a job target.
#[derive(Debug, Default)]
pub struct Listing {
    /// Media files, sorted
    pub files: Vec<PathBuf>,
    /// Media-named symlinks whose target is gone
    pub broken_symlinks: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl Listing {
    /// Every path the listing saw, files and broken links alike.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.binary_search_by(|p| p.as_path().cmp(path)).is_ok()
            || self.broken_symlinks.iter().any(|p| p == path)
    }
}

/// Enumerate media files under `target`.
///
/// Symlinks are followed. A target that no longer exists yields an empty
/// listing. Any walk error other than a symlink loop or a broken link fails
/// the enumeration, so files under an unreadable directory are never
/// reported as deleted.
pub fn enumerate(
    target: &Path,
    opts: WalkOptions<'_>,
) -> std::result::Result<Listing, walkdir::Error> {
    let mut listing = Listing::default();

    if !target.exists() {
        tracing::debug!(target = %target.display(), "scan target no longer exists");
        return Ok(listing);
    }

    let max_depth = if opts.recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(target)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(is_hidden(e.path()) || opts.ignore.is_ignored(e.path()))
        });

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_extension(entry.path(), opts.extensions) {
                    listing.files.push(entry.into_path());
                }
            }
            Err(err) => {
                if let Some(ancestor) = err.loop_ancestor() {
                    listing.warnings.push(format!(
                        "symlink loop at {} (points back to {})",
                        err.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        ancestor.display()
                    ));
                    continue;
                }

                match err.path() {
                    Some(path) if is_broken_symlink(path) => {
                        if opts.symlink_check && has_extension(path, opts.extensions) {
                            listing.broken_symlinks.push(path.to_path_buf());
                        }
                    }
                    _ => {
                        tracing::warn!("Error walking {}: {}", target.display(), err);
                        return Err(err);
                    }
                }
            }
        }
    }

    listing.files.sort();
    listing.broken_symlinks.sort();
    Ok(listing)
}

fn is_broken_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
        && fs::metadata(path).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniscan_common::paths::default_media_extensions;
    use tempfile::tempdir;

    fn opts<'a>(exts: &'a [String], ignore: &'a IgnoreSet, recursive: bool) -> WalkOptions<'a> {
        WalkOptions {
            recursive,
            extensions: exts,
            ignore,
            symlink_check: true,
        }
    }

    #[test]
    fn test_glob_translation() {
        let set = IgnoreSet::new(&[
            "*.partial".to_string(),
            "**/Sample/**".to_string(),
            "@eaDir".to_string(),
        ])
        .unwrap();

        assert!(set.is_ignored(Path::new("/media/a/movie.mkv.partial")));
        assert!(set.is_ignored(Path::new("/media/Movie/Sample/x.mkv")));
        assert!(set.is_ignored(Path::new("/media/@eaDir")));
        assert!(!set.is_ignored(Path::new("/media/Movie/movie.mkv")));
    }

    #[test]
    fn test_single_star_stays_in_component() {
        let set = IgnoreSet::new(&["/media/*/junk".to_string()]).unwrap();
        assert!(set.is_ignored(Path::new("/media/a/junk")));
        assert!(!set.is_ignored(Path::new("/media/a/b/junk")));
    }

    #[test]
    fn test_enumerate_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Show/Season 1")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::create_dir_all(root.join("Sample")).unwrap();
        fs::write(root.join("Show/Season 1/ep1.mkv"), b"x").unwrap();
        fs::write(root.join("Show/Season 1/ep1.nfo"), b"x").unwrap();
        fs::write(root.join("Show/.ep0.mkv"), b"x").unwrap();
        fs::write(root.join(".hidden/a.mkv"), b"x").unwrap();
        fs::write(root.join("Sample/s.mkv"), b"x").unwrap();
        fs::write(root.join("top.mp4"), b"x").unwrap();

        let exts = default_media_extensions();
        let ignore = IgnoreSet::new(&["Sample".to_string()]).unwrap();

        let listing = enumerate(root, opts(&exts, &ignore, true)).unwrap();
        assert_eq!(
            listing.files,
            vec![root.join("Show/Season 1/ep1.mkv"), root.join("top.mp4")]
        );

        let flat = enumerate(root, opts(&exts, &ignore, false)).unwrap();
        assert_eq!(flat.files, vec![root.join("top.mp4")]);
    }

    #[test]
    fn test_missing_target_is_empty() {
        let dir = tempdir().unwrap();
        let exts = default_media_extensions();
        let ignore = IgnoreSet::default();
        let listing = enumerate(&dir.path().join("gone"), opts(&exts, &ignore, true)).unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.warnings.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_reported() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::os::unix::fs::symlink(root.join("nowhere.mkv"), root.join("link.mkv")).unwrap();

        let exts = default_media_extensions();
        let ignore = IgnoreSet::default();
        let listing = enumerate(root, opts(&exts, &ignore, true)).unwrap();
        assert!(listing.files.is_empty());
        assert_eq!(listing.broken_symlinks, vec![root.join("link.mkv")]);

        let mut skip = opts(&exts, &ignore, true);
        skip.symlink_check = false;
        assert!(enumerate(root, skip).unwrap().broken_symlinks.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_fails_enumeration() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Show")).unwrap();
        fs::write(root.join("Show/ep1.avi"), b"x").unwrap();
        fs::write(root.join("top.mkv"), b"x").unwrap();
        fs::set_permissions(root.join("Show"), fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through the mode bits
        let readable = fs::read_dir(root.join("Show")).is_ok();
        let exts = default_media_extensions();
        let ignore = IgnoreSet::default();
        let result = enumerate(root, opts(&exts, &ignore, true));
        fs::set_permissions(root.join("Show"), fs::Permissions::from_mode(0o755)).unwrap();

        if readable {
            return;
        }
        let err = result.unwrap_err();
        assert_eq!(err.path(), Some(root.join("Show").as_path()));
    }
}
