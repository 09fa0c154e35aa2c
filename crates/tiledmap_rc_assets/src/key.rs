//! Cache keys for external tilesets and templates.

use std::borrow::Borrow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;

/// Identifier of a cached tileset or template.
///
/// For path-based loads this is the path itself; for buffer, reader and callback
/// loads it is whatever label the caller chose. While a map is parsed, the key of
/// an external reference is its `source` (tilesets) or `template` (objects)
/// attribute as written, relative to the file that contains it. A tileset
/// preloaded under `grass.tsx` is therefore bound by every map that says
/// `source="grass.tsx"`, whichever directory the map lives in; the file itself
/// is only read, next to the referencing file, when the key is not cached.
///
/// Keys compare by exact bytes: `Grass.tsx`, `grass.tsx` and `../grass.tsx` are
/// three different keys unless [`LoaderConfig::normalize_keys`] is enabled.
///
/// [`LoaderConfig::normalize_keys`]: crate::config::LoaderConfig::normalize_keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(OsString);

impl ResourceKey {
    pub fn new(key: impl Into<OsString>) -> Self {
        Self(key.into())
    }

    /// Build a key from a path, optionally resolving `.` and `..` lexically.
    pub fn from_path(path: impl AsRef<Path>, normalize: bool) -> Self {
        let path = path.as_ref();
        if normalize {
            Self(path.normalize().into_os_string())
        } else {
            Self(path.as_os_str().to_owned())
        }
    }

    #[inline]
    pub fn as_os_str(&self) -> &OsStr {
        &self.0
    }

    /// The key interpreted as a path, which is how the parser addresses it.
    #[inline]
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// The key as UTF-8, if it is valid UTF-8.
    #[inline]
    pub fn to_str(&self) -> Option<&str> {
        self.0.to_str()
    }

    pub fn into_path_buf(self) -> PathBuf {
        PathBuf::from(self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_path().display())
    }
}

impl Borrow<OsStr> for ResourceKey {
    fn borrow(&self) -> &OsStr {
        &self.0
    }
}

impl AsRef<OsStr> for ResourceKey {
    fn as_ref(&self) -> &OsStr {
        &self.0
    }
}

impl AsRef<Path> for ResourceKey {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&Path> for ResourceKey {
    fn from(value: &Path) -> Self {
        Self(value.as_os_str().to_owned())
    }
}

impl From<PathBuf> for ResourceKey {
    fn from(value: PathBuf) -> Self {
        Self(value.into_os_string())
    }
}

impl From<&OsStr> for ResourceKey {
    fn from(value: &OsStr) -> Self {
        Self(value.to_owned())
    }
}

impl From<OsString> for ResourceKey {
    fn from(value: OsString) -> Self {
        Self(value)
    }
}
