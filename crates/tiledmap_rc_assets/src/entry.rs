//! The two kinds of resource a cache stores under one key namespace.

use std::fmt;
use std::sync::Arc;

use bevy::log::debug;

use crate::key::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Tileset,
    Template,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tileset => f.write_str("tileset"),
            Self::Template => f.write_str("template"),
        }
    }
}

/// A cached external resource.
///
/// Documents that resolved the entry hold clones of the same `Arc`, so the
/// payload outlives the cache entry for as long as any document uses it.
#[derive(Debug, Clone)]
pub enum ResourceEntry {
    /// An external tileset (`.tsx`)
    Tileset(Arc<tiled::Tileset>),
    /// An object template (`.tx`)
    Template(Arc<tiled::Template>),
}

impl ResourceEntry {
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Tileset(_) => ResourceKind::Tileset,
            Self::Template(_) => ResourceKind::Template,
        }
    }

    #[inline]
    pub fn as_tileset(&self) -> Option<&Arc<tiled::Tileset>> {
        match self {
            Self::Tileset(tileset) => Some(tileset),
            Self::Template(_) => None,
        }
    }

    #[inline]
    pub fn as_template(&self) -> Option<&Arc<tiled::Template>> {
        match self {
            Self::Template(template) => Some(template),
            Self::Tileset(_) => None,
        }
    }

    /// Whether both entries share the same payload allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Tileset(a), Self::Tileset(b)) => Arc::ptr_eq(a, b),
            (Self::Template(a), Self::Template(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Give up the cache's handle on the payload.
    ///
    /// The payload is dropped right away when the cache held the last handle,
    /// otherwise it is dropped with the last document referencing it.
    pub(crate) fn release(self, key: &ResourceKey) -> Release {
        let kind = self.kind();
        let freed = match self {
            Self::Tileset(tileset) => Arc::into_inner(tileset).is_some(),
            Self::Template(template) => Arc::into_inner(template).is_some(),
        };

        if freed {
            debug!("Released {} `{}`", kind, key);
        } else {
            debug!("Released {} `{}`, still referenced by documents", kind, key);
        }

        Release { kind, freed }
    }
}

impl From<Arc<tiled::Tileset>> for ResourceEntry {
    fn from(value: Arc<tiled::Tileset>) -> Self {
        Self::Tileset(value)
    }
}

impl From<Arc<tiled::Template>> for ResourceEntry {
    fn from(value: Arc<tiled::Template>) -> Self {
        Self::Template(value)
    }
}

/// Outcome of releasing one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Release {
    pub kind: ResourceKind,
    pub freed: bool,
}

/// Tally of the entries a cache released.
///
/// Every released entry counts once under its kind. `deferred` counts the
/// subset whose payload was still referenced by a live document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub tilesets: usize,
    pub templates: usize,
    pub deferred: usize,
}

impl ReleaseReport {
    /// Number of release routine invocations.
    #[inline]
    pub fn total(&self) -> usize {
        self.tilesets + self.templates
    }

    /// Number of payloads freed during the release.
    #[inline]
    pub fn freed(&self) -> usize {
        self.total() - self.deferred
    }

    pub(crate) fn record(&mut self, release: Release) {
        match release.kind {
            ResourceKind::Tileset => self.tilesets += 1,
            ResourceKind::Template => self.templates += 1,
        }
        if !release.freed {
            self.deferred += 1;
        }
    }
}
