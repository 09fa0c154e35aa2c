//! # tiledmap_rc
//!
//! Caching resource manager for Tiled maps, tilesets and object templates.
//!
//! This is a meta-crate over [`assets`] that also re-exports the `tiled`
//! crate, so the parsed data types are available under one dependency.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use tiledmap_rc::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(TiledmapRcPlugin::new(LoaderConfig::default().with_base_dir("assets")))
//!         .add_systems(Startup, load_level)
//!         .run();
//! }
//!
//! fn load_level(cache: Res<SharedResourceCache>) {
//!     match cache.lock().load_document("maps/level1.tmx") {
//!         Ok(level) => info!("level1 uses {} tilesets", level.tilesets.len()),
//!         Err(err) => error!("Failed to load level1: {err}"),
//!     }
//! }
//! ```

// Re-export sub-crates for advanced usage
pub use tiledmap_rc_assets as assets;

pub use tiled;

/// Unified prelude for tiledmap_rc
pub mod prelude {
    pub use crate::assets::prelude::*;
}
