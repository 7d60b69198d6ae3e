//! # tilemap-io - Tile Map Serialization Engine
//!
//! Loads and saves tile-based map documents in several interchange formats
//! through one format-agnostic intermediate representation.
//!
//! ## Features
//!
//! - **Native format**: YAML documents with typed properties and components
//! - **Tiled interop**: JSON (`.tmj`) and XML (`.tmx` / `.tsx`) maps and tilesets
//! - **Godot export**: Godot 3 and Godot 4 text scenes
//! - **Tile-grid codec**: plain or base64 tile data, with `zlib` or `zstd` compression
//! - **Flood fill**: span fill over any tile grid
//!
//! ## Architecture
//!
//! ```text
//!   .yaml ──┐                                  ┌──> .yaml
//!   .tmj  ──┤   FormatRegistry                 ├──> .tmj
//!   .tmx  ──┼──> (by extension) ──> ir::Map ───┼──> .tmx
//!           │                                  └──> .tscn (+ .tres)
//!           │
//!           └── codec: plain | base64 (+ none | zlib | zstd)
//! ```
//!
//! Parsers are pure: a failed load returns an error and nothing else. Saves
//! validate the map first and replace the target file atomically.
//!
//! ## Formats
//!
//! | Format      | Extensions      | Tilesets         | Load | Save |
//! |-------------|-----------------|------------------|------|------|
//! | Native YAML | `yaml`, `yml`   | inline or `yaml` | yes  | yes  |
//! | Tiled JSON  | `json`, `tmj`   | inline or `json` | yes  | yes  |
//! | Tiled XML   | `tmx`, `xml`    | inline or `tsx`  | yes  | yes  |
//! | Godot       | `tscn`          | `tres`           | no   | yes  |
//!
//! Tiled formats have no counterpart for components or vector properties.
//! Components are dropped and vectors are written as strings, both with a
//! warning.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilemap_io::{Config, FormatRegistry};
//!
//! let config = Config::load()?;
//! let registry = FormatRegistry::with_defaults();
//!
//! let map = registry.load_map("level.tmx".as_ref(), &config.read)?;
//! registry.save_map(&map, "level.yaml".as_ref(), &config.write)?;
//! ```
//!
//! ### Flood Fill
//!
//! ```rust,ignore
//! use tilemap_io::fill::flood_fill;
//! use tilemap_io::ir::{Extent, TileMatrix, TilePos};
//!
//! let mut grid = TileMatrix::new(Extent::new(4, 4));
//! let changed = flood_fill(&mut grid, TilePos::new(0, 0), 7)?;
//! assert_eq!(changed.len(), 16);
//! ```
//!
//! ## Modules
//!
//! - [`ir`]: Map, layer, tileset and property types
//! - [`codec`]: Tile-grid encoding and compression providers
//! - [`format`]: Parsers, emitters and the format registry
//! - [`fill`]: Flood fill over tile grids
//! - [`config`]: Read and write options, TOML and environment loading
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod fill;
pub mod format;
pub mod ir;

// Re-exports for convenience
pub use codec::{TileCompression, TileEncoding, TileFormat};
pub use config::{Config, GodotOptions, ReadOptions, TilesetPolicy, WriteOptions};
pub use error::{ErrorKind, MapIoError, Result};
pub use fill::{flood_fill, TileGrid};
pub use format::{FormatRegistry, MapFormat};
pub use ir::{Layer, LayerKind, Map, MapView, Object, TileMatrix, Tileset, TilesetRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
