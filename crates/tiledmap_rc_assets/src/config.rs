//! Loader configuration owned by a [`ResourceCache`](crate::cache::ResourceCache).

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// File name given to root documents that do not come from a path.
pub const DEFAULT_VIRTUAL_ROOT: &str = "memory.tmx";

/// Configuration for every load that goes through a cache.
///
/// The configuration is passed explicitly: a cache owns one and standalone
/// loads take one by reference. Nothing is stored in process-wide state.
///
/// # Example
///
/// ```rust
/// use tiledmap_rc_assets::{LoaderConfig, ResourceCache};
///
/// let cache = ResourceCache::with_config(
///     LoaderConfig::default()
///         .with_base_dir("assets")
///         .with_normalized_keys(true),
/// );
/// assert!(cache.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory that relative filesystem reads are resolved against.
    ///
    /// Keys are not affected: a tileset referenced as `grass.tsx` is cached
    /// under `grass.tsx` and read from `<base_dir>/grass.tsx`.
    pub base_dir: Option<PathBuf>,

    /// Lexically resolve `.` and `..` in keys before storing or looking them up.
    ///
    /// Off by default, in which case keys compare by exact bytes.
    pub normalize_keys: bool,

    /// Upper bound on the number of bytes read from a single source.
    pub max_source_len: Option<u64>,

    /// Path assigned to root documents loaded from a buffer, reader or callback.
    ///
    /// Only its parent directory matters: references inside the document are
    /// resolved relative to it.
    pub virtual_root: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            normalize_keys: false,
            max_source_len: None,
            virtual_root: PathBuf::from(DEFAULT_VIRTUAL_ROOT),
        }
    }
}

impl LoaderConfig {
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_normalized_keys(mut self, normalize_keys: bool) -> Self {
        self.normalize_keys = normalize_keys;
        self
    }

    pub fn with_max_source_len(mut self, max_source_len: u64) -> Self {
        self.max_source_len = Some(max_source_len);
        self
    }

    pub fn with_virtual_root(mut self, virtual_root: impl Into<PathBuf>) -> Self {
        self.virtual_root = virtual_root.into();
        self
    }

    /// Filesystem location a path is actually read from.
    pub fn resolve<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match &self.base_dir {
            Some(base_dir) if path.is_relative() => Cow::Owned(base_dir.join(path)),
            _ => Cow::Borrowed(path),
        }
    }
}
