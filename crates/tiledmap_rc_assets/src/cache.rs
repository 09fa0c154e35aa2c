//! The shared tileset and template cache.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use bevy::log::{debug, warn};
use bevy::platform::collections::HashMap;

use crate::config::LoaderConfig;
use crate::document::Document;
use crate::entry::{ReleaseReport, ResourceEntry, ResourceKind};
use crate::error::{LoadError, LoadResult};
use crate::key::ResourceKey;
use crate::loader;
use crate::source::{Source, SourceResolver};
use crate::staging::{Resolution, Staging};

/// File name of the throwaway map used to parse a standalone template.
const TEMPLATE_PROBE: &str = "tiledmap-rc-template-probe.tmx";

/// Cache of external tilesets (`.tsx`) and object templates (`.tx`).
///
/// Each distinct [`ResourceKey`] maps to exactly one [`ResourceEntry`]. Maps
/// loaded through the cache share its entries instead of parsing their own
/// copies, so a tileset used by fifty maps is parsed and stored once.
///
/// Explicit `load_*` calls always parse and replace whatever the key held.
/// Use [`ensure_tileset`](Self::ensure_tileset) and
/// [`ensure_template`](Self::ensure_template) to skip keys that are already
/// cached. A failed load never modifies the cache.
///
/// The cache is not synchronized. Mutation needs `&mut self`; share it between
/// threads through [`SharedResourceCache`](crate::plugin::SharedResourceCache).
///
/// # Example
///
/// ```rust,no_run
/// use tiledmap_rc_assets::ResourceCache;
///
/// let mut cache = ResourceCache::new();
/// // Both levels say `<tileset firstgid="1" source="../tilesets/grass.tsx"/>`
/// let grass = std::fs::read("assets/tilesets/grass.tsx")?;
/// cache.load_tileset_from_buffer(&grass, "../tilesets/grass.tsx")?;
///
/// let level1 = cache.load_document("assets/maps/level1.tmx")?;
/// let level2 = cache.load_document("assets/maps/level2.tmx")?;
/// assert!(std::sync::Arc::ptr_eq(
///     level1.tileset("../tilesets/grass.tsx").unwrap(),
///     level2.tileset("../tilesets/grass.tsx").unwrap(),
/// ));
///
/// let report = cache.free();
/// println!("released {} resources", report.total());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: HashMap<ResourceKey, ResourceEntry>,
    config: LoaderConfig,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            entries: HashMap::default(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: impl AsRef<OsStr>) -> bool {
        self.get(key).is_some()
    }

    /// Look up the entry stored under `key`.
    ///
    /// Absence is a normal outcome: the key was never loaded, its load failed,
    /// or it was removed.
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&ResourceEntry> {
        let key = self.lookup_key(key.as_ref());
        self.entries.get(&*key)
    }

    /// The tileset stored under `key`, if the key holds a tileset.
    pub fn tileset(&self, key: impl AsRef<OsStr>) -> Option<&Arc<tiled::Tileset>> {
        self.get(key).and_then(ResourceEntry::as_tileset)
    }

    /// The template stored under `key`, if the key holds a template.
    pub fn template(&self, key: impl AsRef<OsStr>) -> Option<&Arc<tiled::Template>> {
        self.get(key).and_then(ResourceEntry::as_template)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ResourceEntry)> {
        self.entries.iter()
    }

    /// Store an already built entry, replacing and releasing any previous one.
    ///
    /// Returns `true` if the key was already occupied.
    pub fn insert(&mut self, key: impl Into<ResourceKey>, entry: ResourceEntry) -> bool {
        let key = self.normalized(key.into());
        self.store(key, entry)
    }

    /// Remove the entry under `key` and release it.
    ///
    /// Documents that resolved the entry keep their handle to its payload.
    pub fn remove(&mut self, key: impl AsRef<OsStr>) -> Option<ResourceKind> {
        let key = self.lookup_key(key.as_ref()).into_owned();
        let (key, entry) = self.entries.remove_entry(key.as_os_str())?;
        Some(entry.release(&key).kind)
    }

    /// Release every entry, leaving an empty cache with the same configuration.
    pub fn clear(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for (key, entry) in self.entries.drain() {
            report.record(entry.release(&key));
        }
        if report.total() > 0 {
            debug!(
                "Released {} tilesets and {} templates ({} still in use)",
                report.tilesets, report.templates, report.deferred
            );
        }
        report
    }

    /// Tear the cache down, releasing every entry exactly once.
    ///
    /// Dropping the cache does the same; this variant reports what was released.
    pub fn free(mut self) -> ReleaseReport {
        self.clear()
    }

    // ===== TILESETS =====

    /// Load a tileset from the file at `path`, using the path as the key.
    pub fn load_tileset(&mut self, path: impl AsRef<Path>) -> LoadResult<Arc<tiled::Tileset>> {
        let path = path.as_ref();
        self.load_tileset_from(Source::path(path), path)
    }

    /// Load a tileset from an in-memory buffer and store it under `key`.
    pub fn load_tileset_from_buffer(
        &mut self,
        bytes: &[u8],
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Tileset>> {
        self.load_tileset_from(Source::buffer(bytes), key)
    }

    /// Load a tileset from an open handle and store it under `key`.
    ///
    /// The handle is only borrowed and stays open.
    pub fn load_tileset_from_reader(
        &mut self,
        handle: &mut dyn Read,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Tileset>> {
        self.load_tileset_from(Source::handle(handle), key)
    }

    /// Load a tileset by pulling bytes from `pull` and store it under `key`.
    pub fn load_tileset_from_callback(
        &mut self,
        pull: impl FnMut(&mut [u8]) -> io::Result<usize>,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Tileset>> {
        self.load_tileset_from(Source::callback(pull), key)
    }

    /// Parse a tileset from any source and store it under `key`.
    ///
    /// The tileset is parsed even if `key` is already cached; on success the
    /// previous entry is replaced and released.
    pub fn load_tileset_from(
        &mut self,
        source: Source<'_>,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Tileset>> {
        let key = self.normalized(key.into());
        let bytes = source.read_all(&key, &self.config)?;

        let tileset = {
            let reader = SourceResolver::new(&self.config).serve(key.as_path(), bytes);
            let mut loader =
                tiled::Loader::with_cache_and_reader(tiled::DefaultResourceCache::new(), reader);
            loader.load_tsx_tileset(key.as_path())
        }
        .map_err(|err| LoadError::malformed(&key, err))?;

        let tileset = Arc::new(tileset);
        debug!("Loaded tileset `{}` ({})", key, tileset.name);
        self.store(key, ResourceEntry::Tileset(tileset.clone()));
        Ok(tileset)
    }

    /// Return the cached tileset at `path`, loading it only if it is absent.
    pub fn ensure_tileset(&mut self, path: impl AsRef<Path>) -> LoadResult<Arc<tiled::Tileset>> {
        let path = path.as_ref();
        match self.tileset(path) {
            Some(tileset) => Ok(tileset.clone()),
            None => self.load_tileset(path),
        }
    }

    // ===== TEMPLATES =====

    /// Load a template from the file at `path`, using the path as the key.
    pub fn load_template(&mut self, path: impl AsRef<Path>) -> LoadResult<Arc<tiled::Template>> {
        let path = path.as_ref();
        self.load_template_from(Source::path(path), path)
    }

    /// Load a template from an in-memory buffer and store it under `key`.
    pub fn load_template_from_buffer(
        &mut self,
        bytes: &[u8],
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Template>> {
        self.load_template_from(Source::buffer(bytes), key)
    }

    /// Load a template from an open handle and store it under `key`.
    ///
    /// The handle is only borrowed and stays open.
    pub fn load_template_from_reader(
        &mut self,
        handle: &mut dyn Read,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Template>> {
        self.load_template_from(Source::handle(handle), key)
    }

    /// Load a template by pulling bytes from `pull` and store it under `key`.
    pub fn load_template_from_callback(
        &mut self,
        pull: impl FnMut(&mut [u8]) -> io::Result<usize>,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Template>> {
        self.load_template_from(Source::callback(pull), key)
    }

    /// Parse a template from any source and store it under `key`.
    ///
    /// A tileset the template refers to is resolved relative to `key` through
    /// this cache, and cached alongside the template if it was not already.
    pub fn load_template_from(
        &mut self,
        source: Source<'_>,
        key: impl Into<ResourceKey>,
    ) -> LoadResult<Arc<tiled::Template>> {
        let key = self.normalized(key.into());
        let probe = template_probe(&key)?;
        let bytes = source.read_all(&key, &self.config)?;

        // The parser only reads templates on behalf of a map object, so the
        // template is parsed through a one-object map that references it.
        let resolution = {
            let reader = SourceResolver::new(&self.config)
                .serve(TEMPLATE_PROBE, probe)
                .serve(key.as_path(), bytes);
            let staging = Staging::new(self, Path::new(TEMPLATE_PROBE)).masking(key.clone());
            let mut loader = tiled::Loader::with_cache_and_reader(staging, reader);
            loader
                .load_tmx_map(TEMPLATE_PROBE)
                .map_err(|err| LoadError::malformed(&key, err))?;
            loader.cache().resolution()
        };

        let template = resolution
            .fresh
            .iter()
            .find(|(fresh_key, _)| *fresh_key == key)
            .and_then(|(_, entry)| entry.as_template().cloned())
            .ok_or_else(|| LoadError::Missing {
                key: key.clone(),
                kind: ResourceKind::Template,
            })?;

        debug!("Loaded template `{}`", key);
        self.commit(resolution);
        Ok(template)
    }

    /// Return the cached template at `path`, loading it only if it is absent.
    pub fn ensure_template(&mut self, path: impl AsRef<Path>) -> LoadResult<Arc<tiled::Template>> {
        let path = path.as_ref();
        match self.template(path) {
            Some(template) => Ok(template.clone()),
            None => self.load_template(path),
        }
    }

    // ===== DOCUMENTS =====

    /// Load a map through this cache.
    ///
    /// Tilesets and templates it references are taken from the cache, or
    /// loaded and cached if absent. See [`loader::load_document`].
    pub fn load_document<'a>(&mut self, source: impl Into<Source<'a>>) -> LoadResult<Document> {
        loader::load_document(Some(self), source.into())
    }

    // ===== INTERNALS =====

    /// Key under which lookups of `key` are answered.
    fn lookup_key<'k>(&self, key: &'k OsStr) -> Cow<'k, OsStr> {
        if self.config.normalize_keys {
            Cow::Owned(ResourceKey::from_path(key, true).as_os_str().to_owned())
        } else {
            Cow::Borrowed(key)
        }
    }

    fn normalized(&self, key: ResourceKey) -> ResourceKey {
        if self.config.normalize_keys {
            ResourceKey::from_path(key.as_path(), true)
        } else {
            key
        }
    }

    /// Insert, releasing the entry previously stored under the key.
    fn store(&mut self, key: ResourceKey, entry: ResourceEntry) -> bool {
        let kind = entry.kind();
        match self.entries.insert(key.clone(), entry) {
            Some(previous) => {
                if previous.kind() != kind {
                    warn!(
                        "Cache key `{}` held a {} and now holds a {}",
                        key,
                        previous.kind(),
                        kind
                    );
                }
                previous.release(&key);
                true
            }
            None => false,
        }
    }

    /// Move the resources staged by a successful parse into the cache.
    pub(crate) fn commit(&mut self, resolution: Resolution) {
        for (key, entry) in resolution.fresh {
            self.store(key, entry);
        }
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.clear();
        }
    }
}

impl tiled::ResourceCache for ResourceCache {
    fn get_tileset(&self, path: impl AsRef<Path>) -> Option<Arc<tiled::Tileset>> {
        self.tileset(path.as_ref()).cloned()
    }

    fn insert_tileset(&mut self, path: impl AsRef<Path>, tileset: Arc<tiled::Tileset>) {
        self.insert(path.as_ref(), ResourceEntry::Tileset(tileset));
    }

    fn get_template(&self, path: impl AsRef<Path>) -> Option<Arc<tiled::Template>> {
        self.template(path.as_ref()).cloned()
    }

    fn insert_template(&mut self, path: impl AsRef<Path>, template: Arc<tiled::Template>) {
        self.insert(path.as_ref(), ResourceEntry::Template(template));
    }
}

/// A minimal map whose only object instantiates the template at `key`.
fn template_probe(key: &ResourceKey) -> LoadResult<Vec<u8>> {
    let key_str = key
        .to_str()
        .ok_or_else(|| LoadError::InvalidKey(format!("template key `{key}` is not valid UTF-8")))?;
    // Attribute value normalization would turn these into spaces.
    if key_str.contains(['\t', '\n', '\r']) {
        return Err(LoadError::InvalidKey(format!(
            "template key {key_str:?} contains a tab or line break"
        )));
    }

    Ok(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<map version="1.10" orientation="orthogonal" renderorder="right-down" "#,
            r#"width="1" height="1" tilewidth="1" tileheight="1" infinite="0" "#,
            r#"nextlayerid="2" nextobjectid="2">"#,
            r#"<objectgroup id="1" name="template">"#,
            r#"<object id="1" template="{}"/>"#,
            r#"</objectgroup>"#,
            r#"</map>"#
        ),
        escape_attribute(key_str)
    )
    .into_bytes())
}

fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
