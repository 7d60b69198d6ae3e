//! Format-agnostic intermediate representation.
//!
//! Every parser produces these types and every emitter consumes them. The
//! tree is plain owned data:
//!
//! ```text
//! Map
//! ├── tilesets: [TilesetRef { first_id, source, tileset }]
//! └── layers:   [Layer]
//!               ├── Tile(TileMatrix)
//!               ├── Object([Object])
//!               └── Group([Layer])
//! ```
//!
//! Properties and components live in [`Metadata`], which every node carries.

pub mod attribute;
pub mod grid;
pub mod map;

pub use attribute::{
    path_to_text, widen, Attribute, AttributeMap, AttributeType, Color, Float2, Metadata, ObjectRef,
};
pub use grid::{Extent, TileId, TileIndex, TileMatrix, TilePos, EMPTY_TILE};
pub use map::{
    AnimationFrame, Layer, LayerKind, Map, MapView, Object, ObjectKind, Orientation, TileData,
    Tileset, TilesetRef, TilesetSource,
};
