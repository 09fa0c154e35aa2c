use std::io;

use thiserror::Error;

use crate::entry::ResourceKind;
use crate::key::ResourceKey;

/// Failure of a single tileset, template or document load.
///
/// A failed load never modifies the cache it was given.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Source unavailable for `{key}`: {source}")]
    SourceUnavailable {
        key: ResourceKey,
        #[source]
        source: io::Error,
    },

    #[error("Source for `{0}` produced no bytes")]
    EmptySource(ResourceKey),

    #[error("Source for `{key}` exceeds the limit of {limit} bytes")]
    SourceTooLarge { key: ResourceKey, limit: u64 },

    #[error("Failed to parse `{key}`: {source}")]
    Malformed {
        key: ResourceKey,
        #[source]
        source: tiled::Error,
    },

    #[error("Tileset list of `{key}` is invalid: {reason}")]
    InvalidTilesets { key: ResourceKey, reason: String },

    #[error("Parsing `{key}` produced no {kind}")]
    Missing { key: ResourceKey, kind: ResourceKind },

    #[error("Invalid resource key: {0}")]
    InvalidKey(String),
}

/// Coarse classification of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes could not be obtained: missing file, I/O error, empty or oversized source.
    SourceUnavailable,
    /// The bytes were read but do not describe a valid resource.
    MalformedResource,
    /// The key cannot address a resource.
    InvalidKey,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { .. } | Self::EmptySource(_) | Self::SourceTooLarge { .. } => {
                ErrorKind::SourceUnavailable
            }
            // A file referenced from inside the document could not be read.
            Self::Malformed {
                source: tiled::Error::ResourceLoadingError { .. },
                ..
            } => ErrorKind::SourceUnavailable,
            Self::Malformed { .. } | Self::InvalidTilesets { .. } | Self::Missing { .. } => {
                ErrorKind::MalformedResource
            }
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
        }
    }

    /// Key of the resource whose load failed, if the failure is tied to one.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Self::SourceUnavailable { key, .. }
            | Self::EmptySource(key)
            | Self::SourceTooLarge { key, .. }
            | Self::Malformed { key, .. }
            | Self::InvalidTilesets { key, .. }
            | Self::Missing { key, .. } => Some(key),
            Self::InvalidKey(_) => None,
        }
    }

    pub(crate) fn malformed(key: &ResourceKey, source: tiled::Error) -> Self {
        Self::Malformed {
            key: key.clone(),
            source,
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
