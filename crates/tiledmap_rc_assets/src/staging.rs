//! Transactional view of a [`ResourceCache`] used while the parser runs.
//!
//! The parser resolves external references through [`tiled::ResourceCache`].
//! Lookups fall through to the underlying cache, inserts stay in the staging
//! area, and the caller commits them only once the whole load succeeded. A
//! failed parse therefore leaves the cache exactly as it was.
//!
//! The parser hands over references already joined onto the directory of the
//! file that contains them. Keys are the reference as written in that file,
//! so the directory is stripped again; the joined path is only used to read.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bevy::platform::collections::HashMap;

use crate::cache::ResourceCache;
use crate::entry::ResourceEntry;
use crate::key::ResourceKey;

pub(crate) struct Staging<'c> {
    base: &'c ResourceCache,
    normalize_keys: bool,
    /// Key the base cache must not answer for, because it is being reloaded.
    masked: Option<ResourceKey>,
    staged: HashMap<ResourceKey, ResourceEntry>,
    /// Every key the parser resolved, in first-resolution order.
    resolved: RefCell<Vec<(ResourceKey, ResourceEntry)>>,
    /// Directories of the files being parsed, innermost last.
    scopes: RefCell<Vec<PathBuf>>,
}

/// What a successful parse resolved and loaded.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    /// Entries parsed during the load that are not in the base cache yet.
    pub fresh: Vec<(ResourceKey, ResourceEntry)>,
    /// Every entry the parse bound by key, cached or fresh.
    pub resolved: Vec<(ResourceKey, ResourceEntry)>,
}

impl<'c> Staging<'c> {
    /// Stage loads for the file parsed as `root`.
    pub fn new(base: &'c ResourceCache, root: &Path) -> Self {
        Self {
            base,
            normalize_keys: base.config().normalize_keys,
            masked: None,
            staged: HashMap::default(),
            resolved: RefCell::new(Vec::new()),
            scopes: RefCell::new(vec![directory_of(root)]),
        }
    }

    /// Force a fresh parse of `key` even when the base cache already holds it.
    pub fn masking(mut self, key: ResourceKey) -> Self {
        self.masked = Some(key);
        self
    }

    /// Key of a reference: the path relative to the file that contains it.
    fn key(&self, path: &Path) -> ResourceKey {
        let scopes = self.scopes.borrow();
        let relative = scopes
            .last()
            .and_then(|dir| path.strip_prefix(dir).ok())
            .unwrap_or(path);
        ResourceKey::from_path(relative, self.normalize_keys)
    }

    fn lookup(&self, key: &ResourceKey) -> Option<&ResourceEntry> {
        if let Some(entry) = self.staged.get(key) {
            return Some(entry);
        }
        if self.masked.as_ref() == Some(key) {
            return None;
        }
        self.base.get(key.as_os_str())
    }

    fn record(&self, key: ResourceKey, entry: &ResourceEntry) {
        let mut resolved = self.resolved.borrow_mut();
        match resolved.iter_mut().find(|(resolved_key, _)| *resolved_key == key) {
            // One namespace for both kinds: the latest binding of a key wins.
            Some((_, existing)) => *existing = entry.clone(),
            None => resolved.push((key, entry.clone())),
        }
    }

    fn stage(&mut self, key: ResourceKey, entry: ResourceEntry) {
        self.record(key.clone(), &entry);
        self.staged.insert(key, entry);
    }

    /// Snapshot the outcome of the parse.
    ///
    /// Takes `&self` because the parser keeps ownership of the staging area
    /// until it is dropped; entries are cheap `Arc` clones.
    pub fn resolution(&self) -> Resolution {
        let resolved = self.resolved.borrow().clone();
        let fresh = resolved
            .iter()
            .filter(|(key, entry)| {
                self.staged
                    .get(key)
                    .is_some_and(|staged| staged.ptr_eq(entry))
            })
            .cloned()
            .collect();
        Resolution { fresh, resolved }
    }
}

impl tiled::ResourceCache for Staging<'_> {
    fn get_tileset(&self, path: impl AsRef<Path>) -> Option<Arc<tiled::Tileset>> {
        let key = self.key(path.as_ref());
        let entry = self.lookup(&key)?.clone();
        let tileset = entry.as_tileset().cloned()?;
        self.record(key, &entry);
        Some(tileset)
    }

    fn insert_tileset(&mut self, path: impl AsRef<Path>, tileset: Arc<tiled::Tileset>) {
        let key = self.key(path.as_ref());
        self.stage(key, ResourceEntry::Tileset(tileset));
    }

    fn get_template(&self, path: impl AsRef<Path>) -> Option<Arc<tiled::Template>> {
        let path = path.as_ref();
        let key = self.key(path);
        let cached = self.lookup(&key).and_then(|entry| {
            let template = entry.as_template().cloned()?;
            self.record(key, entry);
            Some(template)
        });

        // A miss is followed by parsing the template, whose own references
        // are relative to the template file until it is inserted.
        if cached.is_none() {
            self.scopes.borrow_mut().push(directory_of(path));
        }
        cached
    }

    fn insert_template(&mut self, path: impl AsRef<Path>, template: Arc<tiled::Template>) {
        let scopes = self.scopes.get_mut();
        if scopes.len() > 1 {
            scopes.pop();
        }
        let key = self.key(path.as_ref());
        self.stage(key, ResourceEntry::Template(template));
    }
}

fn directory_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
