//! Caching resource manager for Tiled maps.
//!
//! Maps (`.tmx`) refer to external tilesets (`.tsx`) and object templates
//! (`.tx`) by path. A [`ResourceCache`] parses each of those once and shares
//! it with every map loaded through it, so fifty maps using the same tileset
//! hold fifty handles to a single parsed tileset.
//!
//! Resources are read from a [`Source`]: a path, an in-memory buffer, a
//! borrowed reader or a pull callback. Every load is all-or-nothing; a failure
//! leaves the cache exactly as it was.

pub mod cache;
pub mod config;
pub mod document;
pub mod entry;
pub mod error;
pub mod key;
pub mod loader;
pub mod plugin;
pub mod source;

mod staging;

#[cfg(test)]
mod fixtures;

pub use cache::ResourceCache;
pub use config::LoaderConfig;
pub use document::{Document, TilesetReference};
pub use entry::{ReleaseReport, ResourceEntry, ResourceKind};
pub use error::{ErrorKind, LoadError, LoadResult};
pub use key::ResourceKey;
pub use loader::{
    load_document, load_document_from_buffer, load_document_from_callback,
    load_document_from_path, load_document_from_reader, load_document_standalone,
};
pub use plugin::{SharedResourceCache, TiledmapRcPlugin};
pub use source::{BoundedRead, Source, SourceStream};

/// Prelude module for convenient imports
///
/// # Example
/// ```no_run
/// use tiledmap_rc_assets::prelude::*;
///
/// let mut cache = ResourceCache::new();
/// let document = cache.load_document("assets/maps/level1.tmx")?;
/// for reference in document.external_tilesets() {
///     println!("{:?} starts at gid {}", reference.key, reference.first_gid);
/// }
/// # Ok::<(), LoadError>(())
/// ```
pub mod prelude {
    pub use crate::cache::ResourceCache;
    pub use crate::config::LoaderConfig;
    pub use crate::document::{Document, TilesetReference};
    pub use crate::entry::{ResourceEntry, ResourceKind};
    pub use crate::error::{ErrorKind, LoadError};
    pub use crate::plugin::{SharedResourceCache, TiledmapRcPlugin};
    pub use crate::source::Source;
}
