//! Map (`.tmx`) loading, with or without a [`ResourceCache`].
//!
//! Every entry point funnels into one routine: read the source, parse it while
//! external tilesets and templates are resolved through a staging view of the
//! cache, then normalize the map into a [`Document`]. Staged resources reach
//! the cache only if the whole map parsed.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use bevy::log::debug;

use crate::cache::ResourceCache;
use crate::config::LoaderConfig;
use crate::document::{self, Document};
use crate::error::{LoadError, LoadResult};
use crate::key::ResourceKey;
use crate::source::{Source, SourceResolver};
use crate::staging::Staging;

/// Load a map from any source.
///
/// With `Some(cache)`, references already cached are reused and the ones that
/// are not are loaded and committed to the cache once the map parsed. With
/// `None`, the document is standalone: it owns everything it resolved and no
/// cache is touched.
///
/// Sources without a path are parsed as [`LoaderConfig::virtual_root`], so
/// relative references in them resolve next to that path.
pub fn load_document(cache: Option<&mut ResourceCache>, source: Source<'_>) -> LoadResult<Document> {
    match cache {
        Some(cache) => load_through(cache, source, true),
        None => load_document_standalone(source, &LoaderConfig::default()),
    }
}

/// Load a map without a cache, using `config` to read its references.
pub fn load_document_standalone(source: Source<'_>, config: &LoaderConfig) -> LoadResult<Document> {
    let mut scratch = ResourceCache::with_config(config.clone());
    load_through(&mut scratch, source, false)
}

pub fn load_document_from_path(
    cache: Option<&mut ResourceCache>,
    path: impl AsRef<Path>,
) -> LoadResult<Document> {
    load_document(cache, Source::path(path.as_ref()))
}

pub fn load_document_from_buffer(
    cache: Option<&mut ResourceCache>,
    bytes: &[u8],
) -> LoadResult<Document> {
    load_document(cache, Source::buffer(bytes))
}

/// Load a map from an open handle. The handle is only borrowed and stays open.
pub fn load_document_from_reader(
    cache: Option<&mut ResourceCache>,
    handle: &mut dyn Read,
) -> LoadResult<Document> {
    load_document(cache, Source::handle(handle))
}

pub fn load_document_from_callback(
    cache: Option<&mut ResourceCache>,
    pull: impl FnMut(&mut [u8]) -> io::Result<usize>,
) -> LoadResult<Document> {
    load_document(cache, Source::callback(pull))
}

fn load_through(cache: &mut ResourceCache, source: Source<'_>, commit: bool) -> LoadResult<Document> {
    let path: PathBuf = source
        .as_path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache.config().virtual_root.clone());
    let key = ResourceKey::from(path.as_path());
    let bytes = source.read_all(&key, cache.config())?;
    let first_gids = document::scan_first_gids(&bytes);

    let (map, resolution) = {
        let reader = SourceResolver::new(cache.config()).serve(path.as_path(), bytes);
        let mut loader = tiled::Loader::with_cache_and_reader(Staging::new(cache, &path), reader);
        let map = loader
            .load_tmx_map(&path)
            .map_err(|err| LoadError::malformed(&key, err))?;
        (map, loader.cache().resolution())
    };

    let invalid = |reason: String| LoadError::InvalidTilesets {
        key: key.clone(),
        reason,
    };
    let first_gids = first_gids.map_err(invalid)?;
    if first_gids.len() != map.tilesets().len() {
        return Err(invalid(format!(
            "{} `firstgid` attributes for {} tilesets",
            first_gids.len(),
            map.tilesets().len()
        )));
    }

    let document = Document::normalize(path, map, &first_gids, &resolution.resolved, commit);
    debug!(
        "Loaded map `{}`: {} tilesets, {} templates, {} new resources",
        key,
        document.tilesets.len(),
        document.templates.len(),
        if commit { resolution.fresh.len() } else { 0 }
    );

    if commit {
        cache.commit(resolution);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{self, BUSH_TX, CHEST_TX, DIRT_TSX, FIELD_TMX, GRASS_TSX, MEADOW_TMX};

    fn primed_cache() -> ResourceCache {
        let mut cache = ResourceCache::new();
        cache
            .load_tileset_from_buffer(GRASS_TSX.as_bytes(), "grass.tsx")
            .expect("tileset loads");
        cache
            .load_template_from_buffer(CHEST_TX.as_bytes(), "chest.tx")
            .expect("template loads");
        cache
    }

    #[test]
    fn test_document_shares_cached_references() {
        let mut cache = primed_cache();
        let document = cache
            .load_document(Source::buffer(MEADOW_TMX.as_bytes()))
            .expect("map loads");

        let cached = cache.tileset("grass.tsx").expect("tileset cached");
        let resolved = document.tileset("grass.tsx").expect("tileset resolved");
        assert!(Arc::ptr_eq(cached, resolved));

        // Every object instantiated from the template shares the cached one.
        let chest = cache.template("chest.tx").expect("template cached");
        assert!(Arc::ptr_eq(chest, document.template("chest.tx").expect("template resolved")));
        assert!(document.uses_cache());
        assert_eq!(cache.len(), 2, "nothing new was cached");
    }

    #[test]
    fn test_dropping_document_keeps_cache_entries() {
        let mut cache = primed_cache();
        let document = load_document_from_buffer(Some(&mut cache), MEADOW_TMX.as_bytes())
            .expect("map loads");
        drop(document);

        let tileset = cache.tileset("grass.tsx").expect("entry still cached");
        assert_eq!(tileset.name, "grass");
        assert_eq!(Arc::strong_count(tileset), 1);
        assert!(cache.template("chest.tx").is_some());
    }

    #[test]
    fn test_document_outlives_cache() {
        let mut cache = primed_cache();
        let document = load_document_from_buffer(Some(&mut cache), MEADOW_TMX.as_bytes())
            .expect("map loads");

        let report = cache.free();
        assert_eq!(report.total(), 2);
        assert_eq!(report.deferred, 2, "both entries are held by the document");

        let weak = Arc::downgrade(document.tileset("grass.tsx").expect("still bound"));
        assert_eq!(weak.upgrade().map(|t| t.name.clone()).as_deref(), Some("grass"));
        drop(document);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_missing_references_are_loaded_and_cached() {
        let dir = tempfile::tempdir().expect("create tempdir");
        fixtures::write(dir.path(), "grass.tsx", GRASS_TSX);
        fixtures::write(dir.path(), "dirt.tsx", DIRT_TSX);
        fixtures::write(dir.path(), "chest.tx", CHEST_TX);
        let meadow = fixtures::write(dir.path(), "meadow.tmx", MEADOW_TMX);
        let field = fixtures::write(dir.path(), "field.tmx", FIELD_TMX);

        let mut cache = ResourceCache::new();
        let first = load_document_from_path(Some(&mut cache), &meadow).expect("meadow loads");
        assert_eq!(cache.len(), 2);

        // Keyed by the attribute as written, read from next to the map.
        assert!(cache.tileset("grass.tsx").is_some());
        assert!(cache.template("chest.tx").is_some());
        assert!(!cache.contains(dir.path().join("grass.tsx")));

        let second = load_document_from_path(Some(&mut cache), &field).expect("field loads");
        assert_eq!(cache.len(), 3, "only dirt.tsx is new");

        let grass_first = first.tileset("grass.tsx").expect("bound in meadow");
        let grass_second = second.tileset("grass.tsx").expect("bound in field");
        assert!(Arc::ptr_eq(grass_first, grass_second), "parsed once, shared by both maps");
        assert_eq!(second.tilesets[1].first_gid, 5);
        assert_eq!(second.largest_tile_size.x, 32);
    }

    #[test]
    fn test_references_resolve_against_base_dir() {
        let dir = tempfile::tempdir().expect("create tempdir");
        fixtures::write(dir.path(), "grass.tsx", GRASS_TSX);
        fixtures::write(dir.path(), "chest.tx", CHEST_TX);

        let mut cache = ResourceCache::with_config(LoaderConfig::default().with_base_dir(dir.path()));
        let document = load_document_from_buffer(Some(&mut cache), MEADOW_TMX.as_bytes())
            .expect("references found in base dir");

        // Buffer documents sit at the virtual root, so keys stay relative.
        assert_eq!(document.path, PathBuf::from("memory.tmx"));
        assert!(cache.contains("grass.tsx"));
        assert!(cache.contains("chest.tx"));
    }

    #[test]
    fn test_failed_document_commits_nothing() {
        let dir = tempfile::tempdir().expect("create tempdir");
        fixtures::write(dir.path(), "grass.tsx", GRASS_TSX);
        let field = fixtures::write(dir.path(), "field.tmx", FIELD_TMX);

        // grass.tsx parses, dirt.tsx is missing: neither may reach the cache.
        let mut cache = ResourceCache::new();
        let error = load_document_from_path(Some(&mut cache), &field).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(error.key(), Some(&ResourceKey::from(field.as_path())));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_document_leaves_cache_untouched() {
        let mut cache = primed_cache();
        let error = load_document_from_buffer(Some(&mut cache), b"<map version=").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MalformedResource);
        assert_eq!(cache.len(), 2);
        assert_eq!(Arc::strong_count(cache.tileset("grass.tsx").expect("cached")), 1);
    }

    #[test]
    fn test_empty_document_is_unavailable() {
        let mut cache = primed_cache();
        let error = load_document_from_buffer(Some(&mut cache), b"").unwrap_err();
        assert!(matches!(error, LoadError::EmptySource(_)));
    }

    #[test]
    fn test_standalone_document_owns_its_references() {
        let dir = tempfile::tempdir().expect("create tempdir");
        fixtures::write(dir.path(), "grass.tsx", GRASS_TSX);
        fixtures::write(dir.path(), "chest.tx", CHEST_TX);

        let config = LoaderConfig::default().with_base_dir(dir.path());
        let document = load_document_standalone(Source::buffer(MEADOW_TMX.as_bytes()), &config)
            .expect("standalone load");

        assert!(!document.uses_cache());
        let weak = Arc::downgrade(document.tileset("grass.tsx").expect("resolved"));
        let template = Arc::downgrade(document.template("chest.tx").expect("resolved"));
        drop(document);
        assert!(weak.upgrade().is_none());
        assert!(template.upgrade().is_none());
    }

    #[test]
    fn test_standalone_load_without_references_on_disk_fails() {
        let error = load_document_from_buffer(None, MEADOW_TMX.as_bytes()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SourceUnavailable);
    }

    #[test]
    fn test_handle_and_callback_documents() {
        let mut cache = primed_cache();

        let mut handle = Cursor::new(MEADOW_TMX.as_bytes().to_vec());
        let from_handle =
            load_document_from_reader(Some(&mut cache), &mut handle).expect("handle load");

        let bytes = MEADOW_TMX.as_bytes();
        let mut offset = 0;
        let from_callback = load_document_from_callback(Some(&mut cache), |buf: &mut [u8]| {
            let chunk = (bytes.len() - offset).min(buf.len()).min(64);
            buf[..chunk].copy_from_slice(&bytes[offset..offset + chunk]);
            offset += chunk;
            Ok(chunk)
        })
        .expect("callback load");

        assert!(Arc::ptr_eq(
            from_handle.tileset("grass.tsx").expect("bound"),
            from_callback.tileset("grass.tsx").expect("bound"),
        ));
        assert_eq!(handle.position(), bytes.len() as u64);
    }

    #[test]
    fn test_template_references_pull_in_their_tilesets() {
        let dir = tempfile::tempdir().expect("create tempdir");
        fixtures::write(dir.path(), "grass.tsx", GRASS_TSX);
        fixtures::write(dir.path(), "bush.tx", BUSH_TX);
        let garden = fixtures::write(
            dir.path(),
            "garden.tmx",
            &MEADOW_TMX.replace("chest.tx", "bush.tx"),
        );

        let mut cache = ResourceCache::new();
        let document = cache.load_document(garden.as_path()).expect("garden loads");

        let grass = cache.tileset("grass.tsx").expect("cached once");
        assert!(Arc::ptr_eq(
            grass,
            document.tileset("grass.tsx").expect("bound by the map"),
        ));
        assert!(cache.template("bush.tx").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_preloaded_references_bind_for_map_in_subdirectory() {
        let dir = tempfile::tempdir().expect("create tempdir");
        // Only the map is on disk; its references exist only in the cache.
        let meadow = fixtures::write(dir.path(), "maps/meadow.tmx", MEADOW_TMX);

        let mut cache = primed_cache();
        let document = load_document_from_path(Some(&mut cache), &meadow)
            .expect("references bound from the cache");

        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(
            cache.tileset("grass.tsx").expect("cached"),
            document.tileset("grass.tsx").expect("bound"),
        ));
        assert!(Arc::ptr_eq(
            cache.template("chest.tx").expect("cached"),
            document.template("chest.tx").expect("bound"),
        ));
    }

    #[test]
    fn test_template_in_subdirectory_keys_its_tileset_by_attribute() {
        let dir = tempfile::tempdir().expect("create tempdir");
        // bush.tx refers to `grass.tsx` next to itself, in props/.
        fixtures::write(dir.path(), "props/bush.tx", BUSH_TX);
        let garden = fixtures::write(
            dir.path(),
            "garden.tmx",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" orientation="orthogonal" renderorder="right-down" width="2" height="2" tilewidth="16" tileheight="16" infinite="0" nextlayerid="2" nextobjectid="2">
 <objectgroup id="1" name="props">
  <object id="1" template="props/bush.tx" x="16" y="16"/>
 </objectgroup>
</map>
"#,
        );

        let mut cache = ResourceCache::new();
        let grass = cache
            .load_tileset_from_buffer(GRASS_TSX.as_bytes(), "grass.tsx")
            .expect("tileset loads");
        cache.load_document(garden.as_path()).expect("garden loads");

        assert!(cache.template("props/bush.tx").is_some());
        let cached = cache.tileset("grass.tsx").expect("still cached");
        assert!(Arc::ptr_eq(&grass, cached), "template bound the preloaded tileset");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_referenced_file_over_length_limit_fails() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let padded = GRASS_TSX.replace("<image", &format!("<!-- {} -->\n <image", "x".repeat(4096)));
        fixtures::write(dir.path(), "grass.tsx", &padded);
        fixtures::write(dir.path(), "dirt.tsx", DIRT_TSX);
        let field = fixtures::write(dir.path(), "field.tmx", FIELD_TMX);

        let mut cache = ResourceCache::with_config(LoaderConfig::default().with_max_source_len(2048));
        let error = load_document_from_path(Some(&mut cache), &field).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SourceUnavailable);
        assert!(cache.is_empty());

        let mut relaxed = ResourceCache::with_config(LoaderConfig::default().with_max_source_len(8192));
        assert!(load_document_from_path(Some(&mut relaxed), &field).is_ok());
    }
}
