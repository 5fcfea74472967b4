//! Path utilities: media extension checks and subtree relationships.
//!
//! Subtree checks are component-wise (`/media/tv` does not contain
//! `/media/tvshows`).

use std::path::Path;

/// Default media file extensions, lowercase and without the leading dot.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "m4p", "m4b", "m4r", "3gp", "mpg",
    "mpeg", "m2v", "m2ts", "ts", "vob", "iso",
];

/// Get the default media extensions as owned strings.
///
/// # Examples
///
/// ```
/// use omniscan_common::paths::default_media_extensions;
///
/// let exts = default_media_extensions();
/// assert!(exts.contains(&"mkv".to_string()));
/// ```
pub fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Check if a path's extension is in `extensions` (case-insensitive, leading
/// dots in the list are tolerated).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use omniscan_common::paths::has_extension;
///
/// let exts = vec!["mkv".to_string(), ".mp4".to_string()];
/// assert!(has_extension(Path::new("/m/Movie.MKV"), &exts));
/// assert!(has_extension(Path::new("/m/clip.mp4"), &exts));
/// assert!(!has_extension(Path::new("/m/movie.nfo"), &exts));
/// ```
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// Whether the final component starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Whether two directories are equal or one contains the other.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use omniscan_common::paths::subtrees_overlap;
///
/// assert!(subtrees_overlap(Path::new("/media/tv/Show"), Path::new("/media/tv")));
/// assert!(!subtrees_overlap(Path::new("/media/tv"), Path::new("/media/tvshows")));
/// ```
pub fn subtrees_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Whether `path` belongs to a scan of `dir`.
///
/// A recursive scan covers the whole subtree, a flat scan only direct
/// children.
pub fn is_in_scope(path: &Path, dir: &Path, recursive: bool) -> bool {
    if recursive {
        path != dir && path.starts_with(dir)
    } else {
        path.parent() == Some(dir)
    }
}
