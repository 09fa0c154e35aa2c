use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;

use bevy::math::{Rect, UVec2, Vec2};
use bevy::platform::collections::HashMap;
use xml::reader::{EventReader, XmlEvent};

use crate::entry::ResourceEntry;
use crate::key::ResourceKey;

/// A loaded map together with the data derived from it.
///
/// The document owns what it parsed itself: layers, objects and embedded
/// tilesets. Tilesets and templates bound by key are shared `Arc`s, the same
/// allocations the [`ResourceCache`](crate::cache::ResourceCache) stores, so
/// dropping a document never releases a cache entry, and dropping the cache
/// never invalidates a document.
#[derive(Debug)]
pub struct Document {
    /// The raw Tiled map data (PRESERVE AS-IS)
    pub map: tiled::Map,

    /// Path the map was parsed as; virtual for buffer, reader and callback loads
    pub path: PathBuf,

    /// Every tileset of the map, in map order
    pub tilesets: Vec<TilesetReference>,

    /// Templates instantiated by objects of the map
    /// Key: `template` attribute as written in the map
    pub templates: HashMap<ResourceKey, Arc<tiled::Template>>,

    // ===== PROCESSED DATA =====
    /// Map size in tiles
    pub tilemap_size: UVec2,

    /// Largest tile size across the map and all of its tilesets
    pub largest_tile_size: UVec2,

    /// Map bounding box in pixels
    pub rect: Rect,

    // ===== INFINITE MAP SUPPORT =====
    pub tiled_offset: Vec2,
    pub topleft_chunk: (i32, i32),
    pub bottomright_chunk: (i32, i32),

    uses_cache: bool,
}

#[derive(Debug, Clone)]
pub struct TilesetReference {
    /// Cache key of an external tileset, `None` for tilesets embedded in the map
    pub key: Option<ResourceKey>,
    pub tileset: Arc<tiled::Tileset>,
    /// First GID of this tileset in the map
    pub first_gid: u32,
}

impl TilesetReference {
    #[inline]
    pub fn is_external(&self) -> bool {
        self.key.is_some()
    }

    /// Whether `gid` falls inside this tileset's range.
    #[inline]
    pub fn contains_gid(&self, gid: u32) -> bool {
        gid >= self.first_gid && gid - self.first_gid < self.tileset.tilecount
    }
}

impl Document {
    /// Normalization pass run on every freshly parsed map.
    ///
    /// `first_gids` holds one entry per tileset of the map, in map order, and
    /// `resolved` lists every tileset and template the parser bound by key.
    pub(crate) fn normalize(
        path: PathBuf,
        map: tiled::Map,
        first_gids: &[u32],
        resolved: &[(ResourceKey, ResourceEntry)],
        uses_cache: bool,
    ) -> Self {
        let mut tilesets = Vec::with_capacity(map.tilesets().len());
        for (tileset, &first_gid) in map.tilesets().iter().zip(first_gids) {
            let key = resolved.iter().find_map(|(key, entry)| {
                entry
                    .as_tileset()
                    .filter(|cached| Arc::ptr_eq(cached, tileset))
                    .map(|_| key.clone())
            });
            tilesets.push(TilesetReference {
                key,
                tileset: tileset.clone(),
                first_gid,
            });
        }

        let templates = resolved
            .iter()
            .filter_map(|(key, entry)| entry.as_template().map(|t| (key.clone(), t.clone())))
            .collect();

        let (tilemap_size, largest_tile_size, rect) = calculate_map_bounds(&map);
        let (tiled_offset, topleft_chunk, bottomright_chunk) = calculate_infinite_map_data(&map);

        Self {
            map,
            path,
            tilesets,
            templates,
            tilemap_size,
            largest_tile_size,
            rect,
            tiled_offset,
            topleft_chunk,
            bottomright_chunk,
            uses_cache,
        }
    }

    /// The external tileset bound to `key`.
    pub fn tileset(&self, key: impl AsRef<OsStr>) -> Option<&Arc<tiled::Tileset>> {
        let key = key.as_ref();
        self.tilesets
            .iter()
            .find(|reference| reference.key.as_ref().is_some_and(|k| k.as_os_str() == key))
            .map(|reference| &reference.tileset)
    }

    /// The template bound to `key`.
    pub fn template(&self, key: impl AsRef<OsStr>) -> Option<&Arc<tiled::Template>> {
        self.templates.get(key.as_ref())
    }

    pub fn external_tilesets(&self) -> impl Iterator<Item = &TilesetReference> {
        self.tilesets.iter().filter(|reference| reference.is_external())
    }

    /// The tileset a global tile ID belongs to.
    pub fn tileset_for_gid(&self, gid: u32) -> Option<&TilesetReference> {
        self.tilesets.iter().find(|reference| reference.contains_gid(gid))
    }

    /// Whether the document was loaded through a cache (`true`) or standalone.
    #[inline]
    pub fn uses_cache(&self) -> bool {
        self.uses_cache
    }
}

/// The `firstgid` of every `<tileset>` element of a map, in map order.
///
/// The parsed map does not keep them, and GIDs may leave gaps between
/// tilesets, so they are read back from the map's own bytes.
pub(crate) fn scan_first_gids(bytes: &[u8]) -> Result<Vec<u32>, String> {
    let mut first_gids = Vec::new();
    let mut depth = 0usize;

    for event in EventReader::new(bytes) {
        match event.map_err(|err| err.to_string())? {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                depth += 1;
                // <map> is depth 1, its tilesets depth 2
                if depth == 2 && name.local_name == "tileset" {
                    let attribute = attributes
                        .iter()
                        .find(|attribute| attribute.name.local_name == "firstgid")
                        .ok_or_else(|| "tileset without a `firstgid` attribute".to_string())?;
                    let first_gid = attribute
                        .value
                        .parse::<u32>()
                        .ok()
                        .filter(|gid| *gid > 0)
                        .ok_or_else(|| format!("invalid firstgid `{}`", attribute.value))?;
                    first_gids.push(first_gid);
                }
            }
            XmlEvent::EndElement { .. } => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(first_gids)
}

/// Calculate map bounds and tilemap size
///
/// For finite maps, uses the map dimensions directly.
/// For infinite maps, calculates bounds from chunk data.
///
/// Unlike a map whose tilesets are still loading, every tileset is resolved
/// here, so the largest tile size covers oversized tilesets too.
fn calculate_map_bounds(map: &tiled::Map) -> (UVec2, UVec2, Rect) {
    let largest_tile_size = map.tilesets().iter().fold(
        UVec2::new(map.tile_width, map.tile_height),
        |largest, tileset| largest.max(UVec2::new(tileset.tile_width, tileset.tile_height)),
    );

    let tilemap_size = if map.infinite() {
        match chunk_bounds(map) {
            Some(((min_x, min_y), (max_x, max_y))) => {
                let chunks_wide = (max_x - min_x + 1) as u32;
                let chunks_tall = (max_y - min_y + 1) as u32;
                UVec2::new(
                    chunks_wide * tiled::ChunkData::WIDTH,
                    chunks_tall * tiled::ChunkData::HEIGHT,
                )
            }
            None => UVec2::ZERO,
        }
    } else {
        UVec2::new(map.width, map.height)
    };

    let rect = Rect::new(
        0.0,
        0.0,
        tilemap_size.x as f32 * map.tile_width as f32,
        tilemap_size.y as f32 * map.tile_height as f32,
    );

    (tilemap_size, largest_tile_size, rect)
}

/// Calculate infinite map offset and chunk bounds
///
/// For infinite maps, finds the topmost-left and bottommost-right chunks,
/// and calculates an offset to shift the entire map into positive coordinate space.
///
/// For finite maps, returns zero offset and (0,0) chunk bounds.
fn calculate_infinite_map_data(map: &tiled::Map) -> (Vec2, (i32, i32), (i32, i32)) {
    if !map.infinite() {
        return (Vec2::ZERO, (0, 0), (0, 0));
    }
    let Some((topleft_chunk, bottomright_chunk)) = chunk_bounds(map) else {
        return (Vec2::ZERO, (0, 0), (0, 0));
    };

    // If min chunk is negative, we need to offset by that amount
    let offset = |min_chunk: i32, chunk_size: u32, tile_size: u32| {
        if min_chunk < 0 {
            -min_chunk as f32 * chunk_size as f32 * tile_size as f32
        } else {
            0.0
        }
    };
    let tiled_offset = Vec2::new(
        offset(topleft_chunk.0, tiled::ChunkData::WIDTH, map.tile_width),
        offset(topleft_chunk.1, tiled::ChunkData::HEIGHT, map.tile_height),
    );

    (tiled_offset, topleft_chunk, bottomright_chunk)
}

/// Smallest and largest chunk coordinates over all infinite tile layers.
fn chunk_bounds(map: &tiled::Map) -> Option<((i32, i32), (i32, i32))> {
    let mut bounds: Option<((i32, i32), (i32, i32))> = None;

    for layer in map.layers() {
        if let Some(tile_layer) = layer.as_tile_layer()
            && let tiled::TileLayer::Infinite(infinite_layer) = tile_layer
        {
            for ((chunk_x, chunk_y), _chunk) in infinite_layer.chunks() {
                bounds = Some(match bounds {
                    Some(((min_x, min_y), (max_x, max_y))) => (
                        (min_x.min(chunk_x), min_y.min(chunk_y)),
                        (max_x.max(chunk_x), max_y.max(chunk_y)),
                    ),
                    None => ((chunk_x, chunk_y), (chunk_x, chunk_y)),
                });
            }
        }
    }

    bounds
}
