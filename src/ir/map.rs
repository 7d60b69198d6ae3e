//! Map, layer, object and tileset nodes.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::attribute::{AttributeMap, Float2, Metadata};
use super::grid::{Extent, TileId, TileIndex, TileMatrix};
use crate::codec::TileFormat;
use crate::error::{MapIoError, Result};

/// Map projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// Square grid
    #[default]
    Orthogonal,
    /// Diamond grid
    Isometric,
    /// Staggered isometric grid
    Staggered,
    /// Hexagonal grid
    Hexagonal,
}

impl Orientation {
    /// Tag shared by every textual format
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Orthogonal => "orthogonal",
            Orientation::Isometric => "isometric",
            Orientation::Staggered => "staggered",
            Orientation::Hexagonal => "hexagonal",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = MapIoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "orthogonal" => Ok(Orientation::Orthogonal),
            "isometric" => Ok(Orientation::Isometric),
            "staggered" => Ok(Orientation::Staggered),
            "hexagonal" => Ok(Orientation::Hexagonal),
            other => Err(MapIoError::unsupported("orientation", other)),
        }
    }
}

/// Object shape
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// Single point
    Point,
    /// Axis aligned rectangle
    Rect,
    /// Ellipse inscribed in the object bounds
    Ellipse,
    /// Closed polygon, vertices relative to the object position
    Polygon(Vec<Float2>),
}

impl ObjectKind {
    /// Tag used by the native format
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Point => "point",
            ObjectKind::Rect => "rect",
            ObjectKind::Ellipse => "ellipse",
            ObjectKind::Polygon(_) => "polygon",
        }
    }
}

/// Object placed in an object layer or attached to a tile
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Persistent identifier
    pub id: Option<i32>,
    /// Shape
    pub kind: ObjectKind,
    /// Top-left position in pixels
    pub pos: Float2,
    /// Size in pixels
    pub size: Float2,
    /// Global tile rendered by this object
    pub tile: Option<TileId>,
    /// Free-form type tag
    pub tag: String,
    /// Visibility
    pub visible: bool,
    /// Name, properties and components
    pub meta: Metadata,
}

impl Object {
    /// Visible object of the given shape at the origin
    pub fn new(id: i32, kind: ObjectKind) -> Self {
        Self {
            id: Some(id),
            kind,
            pos: [0.0, 0.0],
            size: [0.0, 0.0],
            tile: None,
            tag: String::new(),
            visible: true,
            meta: Metadata::default(),
        }
    }

    /// Set position and size
    pub fn with_bounds(mut self, pos: Float2, size: Float2) -> Self {
        self.pos = pos;
        self.size = size;
        self
    }

    /// Set name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }
}

/// Layer payload
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Dense tile grid
    Tile(TileMatrix),
    /// Free-standing objects
    Object(Vec<Object>),
    /// Nested layers, drawn in list order
    Group(Vec<Layer>),
}

impl LayerKind {
    /// Tag used by the native format
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Tile(_) => "tile-layer",
            LayerKind::Object(_) => "object-layer",
            LayerKind::Group(_) => "group-layer",
        }
    }
}

/// A node in the layer tree
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Identifier, unique within the map
    pub id: i32,
    /// Name, properties and components
    pub meta: Metadata,
    /// Opacity in `0.0..=1.0`
    pub opacity: f32,
    /// Visibility
    pub visible: bool,
    /// Payload
    pub kind: LayerKind,
}

impl Layer {
    fn with_kind(id: i32, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id,
            meta: Metadata::named(name),
            opacity: 1.0,
            visible: true,
            kind,
        }
    }

    /// Tile layer
    pub fn tile(id: i32, name: impl Into<String>, tiles: TileMatrix) -> Self {
        Self::with_kind(id, name, LayerKind::Tile(tiles))
    }

    /// Object layer
    pub fn object(id: i32, name: impl Into<String>, objects: Vec<Object>) -> Self {
        Self::with_kind(id, name, LayerKind::Object(objects))
    }

    /// Group layer
    pub fn group(id: i32, name: impl Into<String>, children: Vec<Layer>) -> Self {
        Self::with_kind(id, name, LayerKind::Group(children))
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

/// One frame of a tile animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    /// Local tile shown during this frame
    pub tile: TileIndex,
    /// Frame duration in milliseconds
    pub duration_ms: u64,
}

/// Per-tile data of a tileset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileData {
    /// Animation frames, empty for static tiles
    pub frames: Vec<AnimationFrame>,
    /// Collision and marker objects
    pub objects: Vec<Object>,
    /// Name, properties and components
    pub meta: Metadata,
}

impl TileData {
    /// True if nothing besides the index would be written
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.objects.is_empty() && self.meta.is_bare()
    }
}

/// A tileset document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tileset {
    /// Name, properties and components
    pub meta: Metadata,
    /// Source image, relative to the tileset document
    pub image_path: PathBuf,
    /// Source image width in pixels
    pub image_width: u32,
    /// Source image height in pixels
    pub image_height: u32,
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Margin around the image in pixels
    pub margin: u32,
    /// Spacing between tiles in pixels
    pub spacing: u32,
    /// Number of tiles
    pub tile_count: i32,
    /// Number of tile columns in the image
    pub column_count: i32,
    /// Sparse per-tile data keyed by local index
    pub tiles: BTreeMap<TileIndex, TileData>,
}

impl Tileset {
    /// Number of tile rows in the image
    pub fn row_count(&self) -> i32 {
        if self.column_count <= 0 {
            0
        } else {
            (self.tile_count + self.column_count - 1) / self.column_count
        }
    }

    /// Pixel position of a local tile in the source image
    pub fn tile_origin(&self, index: TileIndex) -> (u32, u32) {
        let columns = self.column_count.max(1);
        let col = (index % columns) as u32;
        let row = (index / columns) as u32;
        (
            self.margin + col * (self.tile_width + self.spacing),
            self.margin + row * (self.tile_height + self.spacing),
        )
    }
}

/// Where a tileset referenced by a map lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilesetSource {
    /// Stored inside the map document
    Embedded,
    /// Stored in its own file, relative to the map document
    External(PathBuf),
}

/// A tileset as referenced by a map
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetRef {
    /// Global identifier of the tileset's first tile
    pub first_id: TileId,
    /// Storage location
    pub source: TilesetSource,
    /// The tileset, `None` only when external files were not resolved
    pub tileset: Option<Tileset>,
}

impl TilesetRef {
    /// Embedded reference
    pub fn embedded(first_id: TileId, tileset: Tileset) -> Self {
        Self {
            first_id,
            source: TilesetSource::Embedded,
            tileset: Some(tileset),
        }
    }

    /// External reference with a resolved tileset
    pub fn external(first_id: TileId, path: impl Into<PathBuf>, tileset: Tileset) -> Self {
        Self {
            first_id,
            source: TilesetSource::External(path.into()),
            tileset: Some(tileset),
        }
    }

    /// True if `id` falls inside this tileset's global range
    pub fn contains(&self, id: TileId) -> bool {
        self.tileset
            .as_ref()
            .is_some_and(|ts| {
                let end = i64::from(self.first_id) + i64::from(ts.tile_count);
                id >= self.first_id && i64::from(id) < end
            })
    }
}

/// A map document
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    /// Projection
    pub orientation: Orientation,
    /// Grid extent in tiles
    pub extent: Extent,
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Next free layer id
    pub next_layer_id: i32,
    /// Next free object id
    pub next_object_id: i32,
    /// How tile layers are persisted
    pub tile_format: TileFormat,
    /// Component templates keyed by component name
    pub component_definitions: BTreeMap<String, AttributeMap>,
    /// Referenced tilesets, ordered by appearance
    pub tilesets: Vec<TilesetRef>,
    /// Top-level layers, drawn in list order
    pub layers: Vec<Layer>,
    /// Name, properties and components
    pub meta: Metadata,
}

impl Map {
    /// Empty orthogonal map
    pub fn new(extent: Extent, tile_width: u32, tile_height: u32) -> Self {
        Self {
            orientation: Orientation::Orthogonal,
            extent,
            tile_width,
            tile_height,
            next_layer_id: 1,
            next_object_id: 1,
            tile_format: TileFormat::default(),
            component_definitions: BTreeMap::new(),
            tilesets: Vec::new(),
            layers: Vec::new(),
            meta: Metadata::default(),
        }
    }

    /// Visit every layer depth-first, parents before children
    pub fn visit_layers<'a>(&'a self, visitor: &mut impl FnMut(&'a Layer)) {
        fn walk<'a>(layers: &'a [Layer], visitor: &mut impl FnMut(&'a Layer)) {
            for layer in layers {
                visitor(layer);
                if let LayerKind::Group(children) = &layer.kind {
                    walk(children, visitor);
                }
            }
        }
        walk(&self.layers, visitor);
    }

    /// Resolved tileset whose global range contains `id`
    pub fn find_tileset(&self, id: TileId) -> Option<(&TilesetRef, &Tileset)> {
        self.tilesets
            .iter()
            .filter(|r| r.contains(id))
            .find_map(|r| r.tileset.as_ref().map(|ts| (r, ts)))
    }

    /// Check the invariants every loaded or saved map upholds.
    ///
    /// - extent and tile size are strictly positive
    /// - every tile layer has exactly the map extent
    /// - opacities lie in `0.0..=1.0`
    /// - component instances reference a defined component
    /// - no two tilesets claim the same global tile identifier
    pub fn validate(&self) -> Result<()> {
        if self.extent.is_empty() {
            return Err(MapIoError::InvalidExtent(format!(
                "map is {}x{} tiles",
                self.extent.rows, self.extent.cols
            )));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(MapIoError::InvalidExtent(format!(
                "tile size is {}x{} pixels",
                self.tile_width, self.tile_height
            )));
        }

        let mut failure = None;
        self.visit_layers(&mut |layer| {
            if failure.is_none() {
                failure = self.check_layer(layer).err();
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        self.check_components(&self.meta)?;

        self.check_tileset_ranges()
    }

    fn check_layer(&self, layer: &Layer) -> Result<()> {
        if !(0.0..=1.0).contains(&layer.opacity) {
            return Err(MapIoError::invalid(
                format!("layer {} opacity", layer.id),
                format!("{} is outside 0..=1", layer.opacity),
            ));
        }
        self.check_components(&layer.meta)?;

        match &layer.kind {
            LayerKind::Tile(tiles) if tiles.extent() != self.extent => {
                Err(MapIoError::InvalidExtent(format!(
                    "layer {} is {}x{}, map is {}x{}",
                    layer.id,
                    tiles.rows(),
                    tiles.cols(),
                    self.extent.rows,
                    self.extent.cols
                )))
            },
            LayerKind::Object(objects) => objects
                .iter()
                .try_for_each(|object| self.check_components(&object.meta)),
            _ => Ok(()),
        }
    }

    fn check_components(&self, meta: &Metadata) -> Result<()> {
        match meta
            .components
            .keys()
            .find(|name| !self.component_definitions.contains_key(*name))
        {
            Some(name) => Err(MapIoError::UnknownComponent(name.clone())),
            None => Ok(()),
        }
    }

    fn check_tileset_ranges(&self) -> Result<()> {
        let mut ranges: Vec<(TileId, i32)> = self
            .tilesets
            .iter()
            .map(|r| (r.first_id, r.tileset.as_ref().map_or(0, |ts| ts.tile_count)))
            .collect();
        ranges.sort_unstable();

        if let Some(&(first, _)) = ranges.first() {
            if first < 1 {
                return Err(MapIoError::invalid(
                    "first tile id",
                    format!("{first} must be at least 1"),
                ));
            }
        }

        if let Some(&(first, count)) = ranges.iter().find(|(_, count)| *count < 0) {
            return Err(MapIoError::invalid(
                format!("tileset {first} tile count"),
                format!("{count} is negative"),
            ));
        }

        // Range ends are computed in i64 so ids near i32::MAX cannot wrap.
        for pair in ranges.windows(2) {
            let (prev_first, prev_count) = pair[0];
            let (next_first, _) = pair[1];
            if next_first == prev_first
                || i64::from(prev_first) + i64::from(prev_count) > i64::from(next_first)
            {
                return Err(MapIoError::DuplicateTileId(next_first));
            }
        }

        if let Some(&(first, count)) = ranges.last() {
            if i64::from(first) + i64::from(count) - 1 > i64::from(TileId::MAX) {
                return Err(MapIoError::invalid(
                    format!("tileset {first} tile count"),
                    format!("{count} tiles run past the largest tile id"),
                ));
            }
        }

        Ok(())
    }
}

/// Read-only source of a map snapshot.
///
/// Emitters never see live document state, only the [`Map`] a view
/// produces. Hosts with their own document model implement this to save
/// through the registry.
pub trait MapView {
    /// Produce the map to persist
    fn snapshot(&self) -> Cow<'_, Map>;
}

impl MapView for Map {
    fn snapshot(&self) -> Cow<'_, Map> {
        Cow::Borrowed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Attribute;

    fn tileset(count: i32) -> Tileset {
        Tileset {
            meta: Metadata::named("terrain"),
            image_path: PathBuf::from("terrain.png"),
            image_width: 64,
            image_height: 64,
            tile_width: 16,
            tile_height: 16,
            tile_count: count,
            column_count: 4,
            ..Default::default()
        }
    }

    fn map() -> Map {
        let mut map = Map::new(Extent::new(2, 3), 16, 16);
        map.layers.push(Layer::tile(1, "ground", TileMatrix::new(Extent::new(2, 3))));
        map
    }

    #[test]
    fn test_valid_map() {
        assert!(map().validate().is_ok());
    }

    #[test]
    fn test_zero_extent_rejected() {
        let mut bad = map();
        bad.extent = Extent::new(0, 3);
        assert!(matches!(bad.validate(), Err(MapIoError::InvalidExtent(_))));

        let mut bad = map();
        bad.tile_height = 0;
        assert!(matches!(bad.validate(), Err(MapIoError::InvalidExtent(_))));
    }

    #[test]
    fn test_nested_layer_extent_checked() {
        let mut bad = map();
        bad.layers.push(Layer::group(
            2,
            "group",
            vec![Layer::tile(3, "inner", TileMatrix::new(Extent::new(3, 2)))],
        ));
        assert!(matches!(bad.validate(), Err(MapIoError::InvalidExtent(_))));
    }

    #[test]
    fn test_opacity_range() {
        let mut bad = map();
        bad.layers[0].opacity = 1.5;
        assert!(matches!(bad.validate(), Err(MapIoError::InvalidValue { .. })));
    }

    #[test]
    fn test_tileset_ranges() {
        let mut ok = map();
        ok.tilesets.push(TilesetRef::embedded(1, tileset(16)));
        ok.tilesets.push(TilesetRef::embedded(17, tileset(4)));
        assert!(ok.validate().is_ok());

        let mut overlap = map();
        overlap.tilesets.push(TilesetRef::embedded(1, tileset(16)));
        overlap.tilesets.push(TilesetRef::embedded(10, tileset(4)));
        assert!(matches!(overlap.validate(), Err(MapIoError::DuplicateTileId(10))));
    }

    #[test]
    fn test_tileset_ranges_near_max_id() {
        let mut overlap = map();
        overlap.tilesets.push(TilesetRef::embedded(2147483640, tileset(16)));
        overlap.tilesets.push(TilesetRef::embedded(i32::MAX, tileset(16)));
        assert!(matches!(
            overlap.validate(),
            Err(MapIoError::DuplicateTileId(i32::MAX))
        ));

        let mut past_end = map();
        past_end.tilesets.push(TilesetRef::embedded(i32::MAX - 3, tileset(16)));
        assert!(matches!(past_end.validate(), Err(MapIoError::InvalidValue { .. })));

        let mut last = map();
        last.tilesets.push(TilesetRef::embedded(i32::MAX - 15, tileset(16)));
        assert!(last.validate().is_ok());
        assert!(last.tilesets[0].contains(i32::MAX));
    }

    #[test]
    fn test_negative_tile_count() {
        let mut bad = map();
        bad.tilesets.push(TilesetRef::embedded(1, tileset(-4)));
        assert!(matches!(bad.validate(), Err(MapIoError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_component() {
        let mut bad = map();
        bad.layers[0]
            .meta
            .components
            .insert("Physics".to_string(), AttributeMap::new());
        assert!(matches!(bad.validate(), Err(MapIoError::UnknownComponent(_))));

        bad.component_definitions
            .insert("Physics".to_string(), AttributeMap::new());
        assert!(bad.validate().is_ok());
    }

    #[test]
    fn test_find_tileset() {
        let mut map = map();
        map.tilesets.push(TilesetRef::embedded(1, tileset(16)));
        map.tilesets.push(TilesetRef::external(17, "items.yaml", tileset(4)));

        assert_eq!(map.find_tileset(17).map(|(r, _)| r.first_id), Some(17));
        assert_eq!(map.find_tileset(16).map(|(r, _)| r.first_id), Some(1));
        assert!(map.find_tileset(21).is_none());
        assert!(map.find_tileset(0).is_none());
    }

    #[test]
    fn test_tile_origin() {
        let mut ts = tileset(16);
        ts.margin = 1;
        ts.spacing = 2;
        assert_eq!(ts.tile_origin(0), (1, 1));
        assert_eq!(ts.tile_origin(5), (19, 19));
        assert_eq!(ts.row_count(), 4);
    }

    #[test]
    fn test_map_view_borrows() {
        let mut map = map();
        map.meta = Metadata::named("level").with_property("difficulty", Attribute::Int(3));
        assert!(matches!(map.snapshot(), Cow::Borrowed(_)));
        assert_eq!(map.snapshot().meta.name, "level");
    }
}
