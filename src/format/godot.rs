//! Godot scene export (`.tscn`).
//!
//! The scene tree mirrors the layer tree:
//!
//! ```text
//! Root (Node2D)
//! ├── <tile layer>    TileMap, one AnimatedSprite child per animated cell
//! ├── <object layer>  Node2D
//! │   ├── Object 1    Area2D + CollisionShape2D / CollisionPolygon2D
//! │   └── Object 2    Node2D (points)
//! └── <group layer>   Node2D with nested layers
//! ```
//!
//! Godot 3 scenes (`format=2`) reference a companion `<stem>.tres` TileSet
//! resource written next to the scene. Godot 4 scenes (`format=3`) carry the
//! TileSet as an inline sub-resource. Texture paths are written as `res://`
//! paths relative to the scene, so the scene directory is expected to be the
//! project root. Images are referenced, never copied.

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use super::{MapFormat, StagedFiles};
use crate::config::{GodotOptions, ReadOptions, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{
    path_to_text, widen, Attribute, AttributeMap, Float2, Layer, LayerKind, Map, Metadata,
    Object, ObjectKind, TileId, TileMatrix, Tileset, TilesetRef, TilesetSource, EMPTY_TILE,
};

/// Packing stride of cell coordinates in Godot tile data
const TILE_OFFSET: i32 = 65_536;

/// Godot scene exporter
#[derive(Debug, Clone, Copy, Default)]
pub struct GodotFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Godot3,
    Godot4,
}

impl Dialect {
    fn new(options: &GodotOptions) -> Result<Self> {
        if options.ellipse_vertices < 3 {
            return Err(MapIoError::invalid(
                "godot.ellipse_vertices",
                format!("{} is fewer than 3", options.ellipse_vertices),
            ));
        }
        match options.version {
            3 => Ok(Dialect::Godot3),
            4 => Ok(Dialect::Godot4),
            other => Err(MapIoError::invalid(
                "godot.version",
                format!("{other} is not 3 or 4"),
            )),
        }
    }

    fn format(self) -> u8 {
        match self {
            Dialect::Godot3 => 2,
            Dialect::Godot4 => 3,
        }
    }

    fn call(self, name: &str, args: &[String]) -> String {
        match self {
            Dialect::Godot3 => format!("{name}( {} )", args.join(", ")),
            Dialect::Godot4 => format!("{name}({})", args.join(", ")),
        }
    }

    fn vector2(self, x: impl Display, y: impl Display) -> String {
        self.call("Vector2", &[x.to_string(), y.to_string()])
    }

    fn int_vector2(self, x: impl Display, y: impl Display) -> String {
        match self {
            Dialect::Godot3 => self.vector2(x, y),
            Dialect::Godot4 => self.call("Vector2i", &[x.to_string(), y.to_string()]),
        }
    }

    fn resource_id(self, kind: &str, n: usize) -> String {
        match self {
            Dialect::Godot3 => n.to_string(),
            Dialect::Godot4 => format!("\"{kind}_{n}\""),
        }
    }

    fn ext_id(self, n: usize) -> String {
        match self {
            Dialect::Godot3 => n.to_string(),
            Dialect::Godot4 => format!("\"{n}\""),
        }
    }

    fn int_array(self, values: &[i32]) -> String {
        let name = match self {
            Dialect::Godot3 => "PoolIntArray",
            Dialect::Godot4 => "PackedInt32Array",
        };
        let values: Vec<String> = values.iter().map(i32::to_string).collect();
        self.call(name, &values)
    }

    fn point_array(self, points: &[Float2]) -> String {
        let name = match self {
            Dialect::Godot3 => "PoolVector2Array",
            Dialect::Godot4 => "PackedVector2Array",
        };
        let values: Vec<String> = points
            .iter()
            .flat_map(|&[x, y]| [fixed(x), fixed(y)])
            .collect();
        self.call(name, &values)
    }

    fn texture_type(self) -> &'static str {
        match self {
            Dialect::Godot3 => "Texture",
            Dialect::Godot4 => "Texture2D",
        }
    }

    fn string_name(self, text: &str) -> String {
        match self {
            Dialect::Godot3 => quoted(text),
            Dialect::Godot4 => format!("&{}", quoted(text)),
        }
    }

    fn variant(self, value: &Attribute) -> String {
        let reals = |values: &[f32]| values.iter().map(|&v| real(v)).collect::<Vec<_>>();
        let ints = |values: &[i32]| values.iter().map(i32::to_string).collect::<Vec<_>>();

        match (self, value) {
            (_, Attribute::String(s)) => quoted(s),
            (_, Attribute::Int(v)) => v.to_string(),
            (_, Attribute::Float(v)) => real(*v),
            (_, Attribute::Bool(v)) => v.to_string(),
            (_, Attribute::Path(p)) => quoted(&path_to_text(p)),
            (_, Attribute::Object(o)) => o.0.to_string(),
            (_, Attribute::Color(c)) => self.call("Color", &reals(&c.normalized())),
            (_, Attribute::Float2(v)) => self.call("Vector2", &reals(v)),
            (_, Attribute::Float3(v)) => self.call("Vector3", &reals(v)),
            (Dialect::Godot3, Attribute::Int2(v)) => self.call("Vector2", &ints(v)),
            (Dialect::Godot3, Attribute::Int3(v)) => self.call("Vector3", &ints(v)),
            (Dialect::Godot3, Attribute::Int4(v)) => format!("[ {} ]", ints(v).join(", ")),
            (Dialect::Godot3, Attribute::Float4(v)) => format!("[ {} ]", reals(v).join(", ")),
            (Dialect::Godot4, Attribute::Int2(v)) => self.call("Vector2i", &ints(v)),
            (Dialect::Godot4, Attribute::Int3(v)) => self.call("Vector3i", &ints(v)),
            (Dialect::Godot4, Attribute::Int4(v)) => self.call("Vector4i", &ints(v)),
            (Dialect::Godot4, Attribute::Float4(v)) => self.call("Vector4", &reals(v)),
        }
    }

    fn entries(self, attributes: &AttributeMap) -> Vec<String> {
        attributes
            .iter()
            .map(|(name, value)| format!("{}: {}", quoted(name), self.variant(value)))
            .collect()
    }

    fn metadata(self, section: &mut Section, meta: &Metadata) {
        let components = meta
            .components
            .iter()
            .map(|(name, attributes)| (name, self.entries(attributes)));

        match self {
            Dialect::Godot3 => {
                let mut blocks = Vec::new();
                if !meta.properties.is_empty() {
                    let entries = self.entries(&meta.properties);
                    blocks.push(format!("  \"properties\": {}", block(&entries, 2)));
                }
                if !meta.components.is_empty() {
                    let entries: Vec<String> = components
                        .map(|(name, entries)| format!("{}: {}", quoted(name), block(&entries, 4)))
                        .collect();
                    blocks.push(format!("  \"components\": {}", block(&entries, 2)));
                }
                if !blocks.is_empty() {
                    section.line("__meta__", format!("{{\n{}\n}}", blocks.join(",\n")));
                }
            },
            Dialect::Godot4 => {
                if !meta.properties.is_empty() {
                    let entries = self.entries(&meta.properties);
                    section.line("metadata/properties", format!("{{{}}}", entries.join(", ")));
                }
                if !meta.components.is_empty() {
                    let entries: Vec<String> = components
                        .map(|(name, entries)| {
                            format!("{}: {{{}}}", quoted(name), entries.join(", "))
                        })
                        .collect();
                    section.line("metadata/components", format!("{{{}}}", entries.join(", ")));
                }
            },
        }
    }
}

/// Multi-line dictionary whose closing brace sits at `depth` spaces
fn block(entries: &[String], depth: usize) -> String {
    if entries.is_empty() {
        return "{}".to_string();
    }
    let inner = " ".repeat(depth + 2);
    let body: Vec<String> = entries.iter().map(|e| format!("{inner}{e}")).collect();
    format!("{{\n{}\n{}}}", body.join(",\n"), " ".repeat(depth))
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn real(value: f32) -> String {
    widen(value).to_string()
}

fn fixed(value: f32) -> String {
    format!("{value:.3}")
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Pack `low + high * TILE_OFFSET` into one tile data word.
///
/// `low` must fit below the stride and the packed word in an `i32`.
fn pack(low: i64, high: i64) -> Result<i32> {
    let stride = i64::from(TILE_OFFSET);
    (0..stride)
        .contains(&low)
        .then(|| high.checked_mul(stride)?.checked_add(low))
        .flatten()
        .and_then(|word| i32::try_from(word).ok())
        .ok_or_else(|| {
            MapIoError::InvalidExtent(format!(
                "map too large for Godot cell packing ({low}, {high})"
            ))
        })
}

/// Node names may not contain path or property separators.
fn godot_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | ':' | '.' | '@' | '%' | '"' => '-',
            other => other,
        })
        .collect()
}

fn resource_path(path: &Path) -> String {
    format!("res://{}", path_to_text(path))
}

/// A bracketed header followed by `key = value` lines
#[derive(Debug, Default)]
struct Section {
    header: String,
    lines: Vec<String>,
}

impl Section {
    fn node(name: &str, kind: &str, parent: Option<&str>) -> Self {
        let header = match parent {
            Some(parent) => {
                format!("[node name={} type=\"{kind}\" parent={}]", quoted(name), quoted(parent))
            },
            None => format!("[node name={} type=\"{kind}\"]", quoted(name)),
        };
        Self {
            header,
            lines: Vec::new(),
        }
    }

    fn line(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("{key} = {value}"));
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// External and internal resources of one text resource file
struct Document {
    dialect: Dialect,
    ext_resources: Vec<String>,
    sub_resources: Vec<Section>,
}

impl Document {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ext_resources: Vec::new(),
            sub_resources: Vec::new(),
        }
    }

    /// Register an external resource, returning the expression referencing it
    fn add_ext(&mut self, path: &str, kind: &str) -> String {
        let id = self.dialect.ext_id(self.ext_resources.len() + 1);
        self.ext_resources.push(match self.dialect {
            Dialect::Godot3 => {
                format!("[ext_resource path={} type=\"{kind}\" id={id}]", quoted(path))
            },
            Dialect::Godot4 => {
                format!("[ext_resource type=\"{kind}\" path={} id={id}]", quoted(path))
            },
        });
        self.dialect.call("ExtResource", &[id])
    }

    /// Register a sub-resource, returning the expression referencing it
    fn add_sub(&mut self, kind: &str, mut section: Section) -> String {
        let id = self
            .dialect
            .resource_id(kind, self.sub_resources.len() + 1);
        section.header = format!("[sub_resource type=\"{kind}\" id={id}]");
        self.sub_resources.push(section);
        self.dialect.call("SubResource", &[id])
    }

    fn render(&self, header: &str, tail: &[Section]) -> String {
        let load_steps = self.ext_resources.len() + self.sub_resources.len() + 1;
        let mut out = format!(
            "[{header} load_steps={load_steps} format={}]\n",
            self.dialect.format()
        );
        if !self.ext_resources.is_empty() {
            out.push('\n');
            for resource in &self.ext_resources {
                out.push_str(resource);
                out.push('\n');
            }
        }
        for section in self.sub_resources.iter().chain(tail) {
            out.push('\n');
            out.push_str(&section.to_string());
        }
        out
    }
}

/// A tileset as a Godot atlas source
struct Atlas<'a> {
    source: i32,
    first_id: TileId,
    tileset: &'a Tileset,
    image: PathBuf,
}

impl Atlas<'_> {
    fn cell(&self, id: TileId) -> (i32, i32) {
        let columns = self.tileset.column_count.max(1);
        let index = id - self.first_id;
        (index % columns, index / columns)
    }
}

/// Image path relative to the map, given a tileset stored at its reference
fn image_path(reference: &TilesetRef, tileset: &Tileset) -> PathBuf {
    match &reference.source {
        TilesetSource::External(path) if tileset.image_path.is_relative() => {
            match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.join(&tileset.image_path),
                _ => tileset.image_path.clone(),
            }
        },
        _ => tileset.image_path.clone(),
    }
}

fn atlases(map: &Map) -> Vec<Atlas<'_>> {
    let mut atlases = Vec::new();
    for reference in &map.tilesets {
        let Some(tileset) = reference.tileset.as_ref() else {
            tracing::warn!(
                first_id = reference.first_id,
                "unresolved tileset cannot be exported to Godot"
            );
            continue;
        };
        atlases.push(Atlas {
            source: atlases.len() as i32 + 1,
            first_id: reference.first_id,
            tileset,
            image: image_path(reference, tileset),
        });
    }
    atlases
}

/// Body of a TileSet resource. Godot 4 atlas sources are added to `document`.
fn tileset_lines(
    document: &mut Document,
    atlases: &[Atlas<'_>],
    textures: &[String],
    tile_size: (u32, u32),
) -> Vec<String> {
    let dialect = document.dialect;
    let mut body = Section::default();

    for (atlas, texture) in atlases.iter().zip(textures) {
        let tileset = atlas.tileset;
        match dialect {
            Dialect::Godot3 => {
                let prefix = atlas.source;
                let region = [
                    tileset.margin,
                    tileset.margin,
                    tileset.image_width.saturating_sub(2 * tileset.margin),
                    tileset.image_height.saturating_sub(2 * tileset.margin),
                ]
                .map(|v| v.to_string());

                body.line(&format!("{prefix}/name"), quoted(&tileset.meta.name));
                body.line(&format!("{prefix}/texture"), texture);
                body.line(&format!("{prefix}/tex_offset"), dialect.vector2(0, 0));
                body.line(&format!("{prefix}/modulate"), "Color( 1, 1, 1, 1 )");
                body.line(&format!("{prefix}/region"), dialect.call("Rect2", &region));
                body.line(&format!("{prefix}/tile_mode"), 2);
                body.line(
                    &format!("{prefix}/autotile/icon_coordinate"),
                    dialect.vector2(0, 0),
                );
                body.line(
                    &format!("{prefix}/autotile/tile_size"),
                    dialect.vector2(tileset.tile_width, tileset.tile_height),
                );
                body.line(&format!("{prefix}/autotile/spacing"), tileset.spacing);
                for map in ["occluder_map", "navpoly_map", "priority_map", "z_index_map"] {
                    body.line(&format!("{prefix}/autotile/{map}"), "[  ]");
                }
                body.line(&format!("{prefix}/occluder_offset"), dialect.vector2(0, 0));
                body.line(&format!("{prefix}/navigation_offset"), dialect.vector2(0, 0));
                body.line(&format!("{prefix}/shape_offset"), dialect.vector2(0, 0));
                body.line(
                    &format!("{prefix}/shape_transform"),
                    "Transform2D( 1, 0, 0, 1, 0, 0 )",
                );
                body.line(&format!("{prefix}/shape_one_way"), false);
                body.line(&format!("{prefix}/shape_one_way_margin"), "0.0");
                body.line(&format!("{prefix}/shapes"), "[  ]");
                body.line(&format!("{prefix}/z_index"), 0);
            },
            Dialect::Godot4 => {
                let mut source = Section::default();
                source.line("texture", texture);
                source.line(
                    "margins",
                    dialect.int_vector2(tileset.margin, tileset.margin),
                );
                source.line(
                    "separation",
                    dialect.int_vector2(tileset.spacing, tileset.spacing),
                );
                source.line(
                    "texture_region_size",
                    dialect.int_vector2(tileset.tile_width, tileset.tile_height),
                );
                if tileset.column_count > 0 {
                    for index in 0..tileset.tile_count {
                        let col = index % tileset.column_count;
                        let row = index / tileset.column_count;
                        source.line(&format!("{col}:{row}/0"), 0);
                    }
                }
                let reference = document.add_sub("TileSetAtlasSource", source);
                body.line(&format!("sources/{}", atlas.source), reference);
            },
        }
    }

    if dialect == Dialect::Godot4 {
        body.lines
            .insert(0, format!("tile_size = {}", dialect.int_vector2(tile_size.0, tile_size.1)));
    }
    body.lines
}

/// Standalone TileSet resource text
fn tileset_resource(dialect: Dialect, atlases: &[Atlas<'_>], tile_size: (u32, u32)) -> String {
    let mut document = Document::new(dialect);
    let textures: Vec<String> = atlases
        .iter()
        .map(|atlas| document.add_ext(&resource_path(&atlas.image), dialect.texture_type()))
        .collect();
    let resource = Section {
        header: "[resource]".to_string(),
        lines: tileset_lines(&mut document, atlases, &textures, tile_size),
    };
    document.render("gd_resource type=\"TileSet\"", &[resource])
}

fn ellipse_points(radius: Float2, count: usize) -> Vec<Float2> {
    let n = count as f64;
    (0..count)
        .map(|i| {
            let theta = i as f64 / n * std::f64::consts::TAU;
            [
                (f64::from(radius[0]) * theta.cos()) as f32,
                (f64::from(radius[1]) * theta.sin()) as f32,
            ]
        })
        .collect()
}

struct SceneBuilder<'a> {
    map: &'a Map,
    dialect: Dialect,
    options: &'a GodotOptions,
    atlases: Vec<Atlas<'a>>,
    document: Document,
    nodes: Vec<Section>,
    tileset: String,
    sprite_frames: Option<String>,
    animated: BTreeSet<TileId>,
}

impl<'a> SceneBuilder<'a> {
    fn new(map: &'a Map, dialect: Dialect, options: &'a GodotOptions) -> Self {
        Self {
            map,
            dialect,
            options,
            atlases: atlases(map),
            document: Document::new(dialect),
            nodes: Vec::new(),
            tileset: String::new(),
            sprite_frames: None,
            animated: BTreeSet::new(),
        }
    }

    /// Resources shared by all layers. Returns the companion TileSet resource
    /// for Godot 3.
    fn resources(&mut self, tileset_file: &str) -> Option<String> {
        let dialect = self.dialect;
        let tile_size = (self.map.tile_width, self.map.tile_height);

        let companion = match dialect {
            Dialect::Godot3 => {
                self.tileset = self.document.add_ext(&format!("res://{tileset_file}"), "TileSet");
                Some(tileset_resource(dialect, &self.atlases, tile_size))
            },
            Dialect::Godot4 => None,
        };

        let textures: Vec<String> = self
            .atlases
            .iter()
            .map(|atlas| {
                self.document
                    .add_ext(&resource_path(&atlas.image), dialect.texture_type())
            })
            .collect();

        if dialect == Dialect::Godot4 {
            let lines = tileset_lines(&mut self.document, &self.atlases, &textures, tile_size);
            self.tileset = self
                .document
                .add_sub("TileSet", Section { header: String::new(), lines });
        }

        self.animations(&textures);
        companion
    }

    fn animations(&mut self, textures: &[String]) {
        let dialect = self.dialect;
        let mut animations = Vec::new();

        for (atlas, texture) in self.atlases.iter().zip(textures) {
            let tileset = atlas.tileset;
            for (&index, tile) in &tileset.tiles {
                let Some(first) = tile.frames.first() else {
                    continue;
                };
                let base = first.duration_ms.max(1) as f64;

                let mut frames = Vec::with_capacity(tile.frames.len());
                for frame in &tile.frames {
                    let (x, y) = tileset.tile_origin(frame.tile);
                    let mut region = Section::default();
                    region.line("atlas", texture);
                    region.line(
                        "region",
                        dialect.call(
                            "Rect2",
                            &[x, y, tileset.tile_width, tileset.tile_height].map(|v| v.to_string()),
                        ),
                    );
                    let reference = self.document.add_sub("AtlasTexture", region);
                    frames.push(match dialect {
                        Dialect::Godot3 => reference,
                        Dialect::Godot4 => format!(
                            "{{\n\"duration\": {:.3},\n\"texture\": {reference}\n}}",
                            frame.duration_ms.max(1) as f64 / base
                        ),
                    });
                }

                let id = atlas.first_id + index;
                self.animated.insert(id);
                let frames = match dialect {
                    Dialect::Godot3 => format!("[ {} ]", frames.join(", ")),
                    Dialect::Godot4 => format!("[{}]", frames.join(", ")),
                };
                animations.push(format!(
                    "{{\n\"frames\": {frames},\n\"loop\": true,\n\"name\": {},\n\"speed\": {:.3}\n}}",
                    dialect.string_name(&format!("Tile {id}")),
                    1000.0 / base
                ));
            }
        }

        if !animations.is_empty() {
            let mut section = Section::default();
            section.line("animations", format!("[ {} ]", animations.join(", ")));
            self.sprite_frames = Some(self.document.add_sub("SpriteFrames", section));
        }
    }

    fn common(section: &mut Section, dialect: Dialect, visible: bool, opacity: f32) {
        if !visible {
            section.line("visible", false);
        }
        if opacity != 1.0 {
            let args = ["1".to_string(), "1".to_string(), "1".to_string(), real(opacity)];
            section.line("modulate", dialect.call("Color", &args));
        }
    }

    fn layer(&mut self, layer: &Layer, parent: &str) -> Result<()> {
        let dialect = self.dialect;
        let name = if layer.meta.name.is_empty() {
            format!("Layer {}", layer.id)
        } else {
            godot_name(&layer.meta.name)
        };
        let path = if parent == "." {
            name.clone()
        } else {
            format!("{parent}/{name}")
        };

        match &layer.kind {
            LayerKind::Tile(tiles) => {
                let mut node = Section::node(&name, "TileMap", Some(parent));
                node.line("tile_set", &self.tileset);
                Self::common(&mut node, dialect, layer.visible, layer.opacity);
                let data = dialect.int_array(&self.cells(tiles)?);
                match dialect {
                    Dialect::Godot3 => {
                        node.line("format", 1);
                        node.line("tile_data", data);
                        node.line(
                            "cell_size",
                            dialect.vector2(self.map.tile_width, self.map.tile_height),
                        );
                    },
                    Dialect::Godot4 => {
                        node.line("format", 2);
                        node.line("layer_0/tile_data", data);
                    },
                }
                dialect.metadata(&mut node, &layer.meta);
                self.nodes.push(node);
                self.animated_cells(tiles, &path);
            },
            LayerKind::Object(objects) => {
                let mut node = Section::node(&name, "Node2D", Some(parent));
                Self::common(&mut node, dialect, layer.visible, layer.opacity);
                dialect.metadata(&mut node, &layer.meta);
                self.nodes.push(node);
                for (index, object) in objects.iter().enumerate() {
                    self.object(index, object, &path);
                }
            },
            LayerKind::Group(children) => {
                let mut node = Section::node(&name, "Node2D", Some(parent));
                Self::common(&mut node, dialect, layer.visible, layer.opacity);
                dialect.metadata(&mut node, &layer.meta);
                self.nodes.push(node);
                for child in children {
                    self.layer(child, &path)?;
                }
            },
        }
        Ok(())
    }

    fn atlas_for(&self, id: TileId) -> Option<&Atlas<'a>> {
        self.atlases
            .iter()
            .filter(|atlas| atlas.first_id <= id)
            .max_by_key(|atlas| atlas.first_id)
            .filter(|atlas| id - atlas.first_id < atlas.tileset.tile_count)
    }

    fn cells(&self, tiles: &TileMatrix) -> Result<Vec<i32>> {
        let mut data = Vec::new();
        for (pos, id) in tiles.iter() {
            if id == EMPTY_TILE {
                continue;
            }
            let Some(atlas) = self.atlas_for(id) else {
                tracing::warn!(tile = id, "tile has no exported tileset, cell skipped");
                continue;
            };

            let (col, row) = atlas.cell(id);
            let position = pack(to_i64(pos.col), to_i64(pos.row))?;
            match self.dialect {
                Dialect::Godot3 => {
                    let coords = pack(i64::from(col), i64::from(row))?;
                    data.extend([position, atlas.source, coords]);
                },
                Dialect::Godot4 => {
                    let source = pack(i64::from(atlas.source), i64::from(col))?;
                    data.extend([position, source, row]);
                },
            }
        }
        Ok(data)
    }

    fn animated_cells(&mut self, tiles: &TileMatrix, parent: &str) {
        let Some(frames) = self.sprite_frames.clone() else {
            return;
        };
        let dialect = self.dialect;

        for (pos, id) in tiles.iter() {
            if !self.animated.contains(&id) {
                continue;
            }
            let kind = match dialect {
                Dialect::Godot3 => "AnimatedSprite",
                Dialect::Godot4 => "AnimatedSprite2D",
            };
            let mut node = Section::node(&format!("Tile ({}, {})", pos.row, pos.col), kind, Some(parent));
            node.line(
                "position",
                dialect.vector2(
                    pos.col as u64 * u64::from(self.map.tile_width),
                    pos.row as u64 * u64::from(self.map.tile_height),
                ),
            );
            let animation = format!("Tile {id}");
            match dialect {
                Dialect::Godot3 => {
                    node.line("frames", &frames);
                    node.line("speed_scale", "1.0");
                    node.line("animation", quoted(&animation));
                    node.line("playing", true);
                },
                Dialect::Godot4 => {
                    node.line("sprite_frames", &frames);
                    node.line("animation", dialect.string_name(&animation));
                    node.line("autoplay", quoted(&animation));
                },
            }
            node.line("centered", false);
            self.nodes.push(node);
        }
    }

    fn object(&mut self, index: usize, object: &Object, parent: &str) {
        let dialect = self.dialect;
        let mut name = match object.id {
            Some(id) => format!("Object {id}"),
            None => format!("Object #{}", index + 1),
        };
        if !object.meta.name.is_empty() {
            name.push_str(&format!(" ('{}')", object.meta.name));
        }
        let name = godot_name(&name);

        let [x, y] = object.pos;
        let [width, height] = object.size;
        let center = [x + width / 2.0, y + height / 2.0];
        let (kind, position) = match object.kind {
            ObjectKind::Point => ("Node2D", [x, y]),
            ObjectKind::Rect | ObjectKind::Ellipse => ("Area2D", center),
            ObjectKind::Polygon(_) => ("Area2D", [x, y]),
        };

        let mut node = Section::node(&name, kind, Some(parent));
        node.line("position", dialect.vector2(fixed(position[0]), fixed(position[1])));
        Self::common(&mut node, dialect, object.visible, 1.0);
        dialect.metadata(&mut node, &object.meta);
        self.nodes.push(node);

        let shape_parent = format!("{parent}/{name}");
        let polygon = match &object.kind {
            ObjectKind::Point => return,
            ObjectKind::Rect => {
                let mut shape = Section::default();
                match dialect {
                    Dialect::Godot3 => {
                        shape.line("extents", dialect.vector2(real(width / 2.0), real(height / 2.0)));
                    },
                    Dialect::Godot4 => shape.line("size", dialect.vector2(real(width), real(height))),
                }
                let reference = self.document.add_sub("RectangleShape2D", shape);
                let mut node = Section::node("Shape", "CollisionShape2D", Some(&shape_parent));
                node.line("shape", reference);
                self.nodes.push(node);
                return;
            },
            ObjectKind::Ellipse => {
                ellipse_points([width / 2.0, height / 2.0], self.options.ellipse_vertices)
            },
            ObjectKind::Polygon(points) => points.clone(),
        };

        let mut node = Section::node("Shape", "CollisionPolygon2D", Some(&shape_parent));
        node.line("polygon", dialect.point_array(&polygon));
        self.nodes.push(node);
    }

    fn build(mut self, tileset_file: &str) -> Result<(String, Option<String>)> {
        let companion = self.resources(tileset_file);

        let root_name = if self.map.meta.name.is_empty() {
            "Root".to_string()
        } else {
            godot_name(&self.map.meta.name)
        };
        let mut root = Section::node(&root_name, "Node2D", None);
        self.dialect.metadata(&mut root, &self.map.meta);
        self.nodes.push(root);

        for layer in &self.map.layers {
            self.layer(layer, ".")?;
        }

        let scene = self.document.render("gd_scene", &self.nodes);
        Ok((scene, companion))
    }
}

impl MapFormat for GodotFormat {
    fn name(&self) -> &'static str {
        "Godot"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tscn"]
    }

    fn tileset_extension(&self) -> &'static str {
        "tres"
    }

    fn can_load(&self) -> bool {
        false
    }

    fn load_map(&self, _path: &Path, _options: &ReadOptions) -> Result<Map> {
        Err(MapIoError::UnsupportedOperation {
            format: self.name(),
            operation: "load",
        })
    }

    fn save_map(&self, map: &Map, path: &Path, options: &WriteOptions) -> Result<()> {
        map.validate()?;
        let dialect = Dialect::new(&options.godot)?;
        tracing::debug!(path = %path.display(), version = options.godot.version, "exporting Godot scene");

        let tileset_path = path.with_extension(self.tileset_extension());
        let tileset_file = tileset_path
            .file_name()
            .map_or_else(|| "tileset.tres".to_string(), |name| name.to_string_lossy().into_owned());

        let (scene, companion) =
            SceneBuilder::new(map, dialect, &options.godot).build(&tileset_file)?;

        let mut staged = StagedFiles::default();
        if let Some(resource) = companion {
            staged.stage(&tileset_path, &resource)?;
        }
        staged.stage(path, &scene)?;
        staged.commit()
    }

    fn load_tileset(&self, _path: &Path, _options: &ReadOptions) -> Result<Tileset> {
        Err(MapIoError::UnsupportedOperation {
            format: self.name(),
            operation: "load tileset",
        })
    }

    fn render_tileset(&self, tileset: &Tileset, options: &WriteOptions) -> Result<String> {
        let dialect = Dialect::new(&options.godot)?;
        let atlas = Atlas {
            source: 1,
            first_id: 1,
            tileset,
            image: tileset.image_path.clone(),
        };
        Ok(tileset_resource(
            dialect,
            std::slice::from_ref(&atlas),
            (tileset.tile_width, tileset.tile_height),
        ))
    }
}
