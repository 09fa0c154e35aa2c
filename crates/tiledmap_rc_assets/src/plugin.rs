use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;

use crate::cache::ResourceCache;
use crate::config::LoaderConfig;

/// A [`ResourceCache`] shared across systems and threads.
///
/// We wrap it in `Arc<Mutex<>>` so every loader can work with the same cache
/// regardless of which thread it runs on. The cache itself stays
/// unsynchronized; the lock is the only way to reach it.
#[derive(Resource, Clone, Default, Debug)]
pub struct SharedResourceCache(pub Arc<Mutex<ResourceCache>>);

impl SharedResourceCache {
    pub fn new(config: LoaderConfig) -> Self {
        Self(Arc::new(Mutex::new(ResourceCache::with_config(config))))
    }

    /// Lock the cache for exclusive access.
    ///
    /// A load never leaves the cache half-modified, so a panic while the lock
    /// was held does not poison the data and the guard is recovered.
    pub fn lock(&self) -> MutexGuard<'_, ResourceCache> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Plugin that makes a [`SharedResourceCache`] available as a resource
///
/// # Example
/// ```no_run
/// use bevy::prelude::*;
/// use tiledmap_rc_assets::{LoaderConfig, TiledmapRcPlugin};
///
/// App::new()
///     .add_plugins(TiledmapRcPlugin::new(
///         LoaderConfig::default().with_base_dir("assets"),
///     ))
///     .run();
/// ```
#[derive(Default, Debug, Clone)]
pub struct TiledmapRcPlugin {
    pub config: LoaderConfig,
}

impl TiledmapRcPlugin {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }
}

impl Plugin for TiledmapRcPlugin {
    fn build(&self, app: &mut App) {
        info!(
            "Initializing tileset and template cache (base dir: {:?})",
            self.config.base_dir
        );
        app.insert_resource(SharedResourceCache::new(self.config.clone()));
    }
}
