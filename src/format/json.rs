//! Tiled JSON format (`.tmj`, `.json`).
//!
//! Tile layers are written as integer arrays, or as base64 strings with an
//! optional `zlib` or `zstd` compression tag. Tilesets are embedded or stored
//! as sibling `.json` files. See [`tiled`](super::tiled) for the property
//! mapping and its lossy cases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tiled::{
    compression_tag, parse_tiled_text, recover, tiled_text, tiled_type, warn_dropped_components,
    warn_dropped_tileset_components, zlib_level, TILED_FORMAT_VERSION, TILED_VERSION,
};
use super::{
    effective_tile_format, place_tileset, read_document, resolve_relative,
    save_with_tilesets, MapFormat, TilesetPlacement,
};
use crate::codec::tiles::decode_list;
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::config::{ReadOptions, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{
    path_to_text, widen, AnimationFrame, Attribute, Extent, Layer, LayerKind, Map, Metadata,
    Object, ObjectKind, Orientation, TileData, TileMatrix, Tileset, TilesetRef, TilesetSource,
};

/// The Tiled JSON format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

fn default_true() -> bool {
    true
}

fn one() -> f32 {
    1.0
}

fn is_true(value: &bool) -> bool {
    *value
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonMap {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renderorder: Option<String>,
    width: Option<usize>,
    height: Option<usize>,
    tilewidth: Option<u32>,
    tileheight: Option<u32>,
    #[serde(default)]
    nextlayerid: Option<i32>,
    #[serde(default)]
    nextobjectid: Option<i32>,
    #[serde(default)]
    infinite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compressionlevel: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<Value>,
    #[serde(default)]
    tilesets: Vec<JsonTileset>,
    #[serde(default)]
    layers: Vec<JsonLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonLayer {
    #[serde(default)]
    id: Option<i32>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draworder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objects: Option<Vec<JsonObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layers: Option<Vec<JsonLayer>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonProperty {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    value: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i32>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    point: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    ellipse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    polygon: Option<Vec<JsonPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gid: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

fn is_false(value: &bool) -> bool {
    !is_true(value)
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonPoint {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTileset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    firstgid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    columns: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilewidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tileheight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilecount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imagewidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imageheight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    margin: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spacing: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<JsonTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonTile {
    id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<JsonFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objectgroup: Option<JsonLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonFrame {
    tileid: i32,
    duration: u64,
}

fn parse_document<T: serde::de::DeserializeOwned>(text: &str, root: &str) -> Result<T> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(MapIoError::UnrecognizedRoot(format!(
            "JSON {root} document root must be an object"
        )));
    };
    if let Some(kind) = object.get("type").and_then(Value::as_str) {
        if kind != root {
            return Err(MapIoError::UnrecognizedRoot(format!(
                "expected a JSON {root}, found '{kind}'"
            )));
        }
    }
    Ok(serde_json::from_value(value)?)
}

fn render(value: &impl Serialize, indent: usize) -> Result<String> {
    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(Vec::new(), formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(serializer.into_inner())
        .map_err(|e| MapIoError::invalid("JSON output", e.to_string()))
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_to_attribute(kind: Option<&str>, value: &Value) -> Result<Attribute> {
    let corrupt = || {
        MapIoError::invalid(
            format!("{} property", kind.unwrap_or("untyped")),
            format!("{value}"),
        )
    };
    let int = || {
        value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(corrupt)
    };

    match kind {
        Some("int") => Ok(Attribute::Int(int()?)),
        Some("object") => Ok(Attribute::Object(crate::ir::ObjectRef(int()?))),
        Some("float") => Ok(Attribute::Float(value.as_f64().ok_or_else(corrupt)? as f32)),
        Some("bool") => Ok(Attribute::Bool(value.as_bool().ok_or_else(corrupt)?)),
        None => Ok(match value {
            Value::Bool(b) => Attribute::Bool(*b),
            Value::Number(n) if n.is_i64() => Attribute::Int(int()?),
            Value::Number(n) => Attribute::Float(n.as_f64().ok_or_else(corrupt)? as f32),
            other => Attribute::String(raw_text(other)),
        }),
        Some(other) => parse_tiled_text(Some(other), value.as_str().ok_or_else(corrupt)?),
    }
}

fn attribute_to_json(value: &Attribute) -> Value {
    match value {
        Attribute::Int(v) => Value::from(*v),
        Attribute::Float(v) => Value::from(widen(*v)),
        Attribute::Bool(v) => Value::Bool(*v),
        Attribute::Object(v) => Value::from(v.0),
        other => Value::String(tiled_text(other)),
    }
}

struct Reader<'a> {
    options: &'a ReadOptions,
    extent: Extent,
    tile_format: Option<TileFormat>,
}

impl Reader<'_> {
    fn metadata(&self, name: String, properties: Vec<JsonProperty>) -> Result<Metadata> {
        let mut meta = Metadata::named(name);
        for property in properties {
            let parsed = json_to_attribute(property.kind.as_deref(), &property.value);
            let value = recover(self.options, &property.name, parsed, || {
                raw_text(&property.value)
            })?;
            meta.properties.insert(property.name, value);
        }
        Ok(meta)
    }

    fn object(&self, raw: JsonObject) -> Result<Object> {
        let kind = if raw.point {
            ObjectKind::Point
        } else if raw.ellipse {
            ObjectKind::Ellipse
        } else if let Some(points) = &raw.polygon {
            ObjectKind::Polygon(points.iter().map(|p| [p.x, p.y]).collect())
        } else {
            ObjectKind::Rect
        };
        let tag = if raw.kind.is_empty() { raw.class } else { raw.kind };

        Ok(Object {
            id: raw.id,
            kind,
            pos: [raw.x, raw.y],
            size: [raw.width, raw.height],
            tile: raw.gid,
            tag,
            visible: raw.visible,
            meta: self.metadata(raw.name, raw.properties)?,
        })
    }

    fn tile_data(&mut self, raw: &JsonLayer, id: i32) -> Result<TileMatrix> {
        if raw.width.is_some_and(|w| w != self.extent.cols)
            || raw.height.is_some_and(|h| h != self.extent.rows)
        {
            tracing::warn!(layer = id, "tile layer size differs from map size");
        }

        let encoding = match raw.encoding.as_deref() {
            None | Some("csv") => TileEncoding::Plain,
            Some(other) => other.parse()?,
        };
        let compression = compression_tag(raw.compression.as_deref())?;
        self.tile_format.get_or_insert(TileFormat {
            encoding,
            compression,
            zlib_level: None,
        });

        let data = raw
            .data
            .as_ref()
            .ok_or_else(|| MapIoError::missing(format!("layer {id} data")))?;

        match (encoding, data) {
            (TileEncoding::Plain, Value::Array(values)) => {
                let tiles = values
                    .iter()
                    .map(|v| {
                        v.as_i64()
                            .and_then(|v| i32::try_from(v).ok())
                            .ok_or_else(|| MapIoError::invalid(format!("layer {id} data"), v.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                decode_list(tiles, self.extent)
            },
            (TileEncoding::Base64, Value::String(text)) => {
                TileFormat::base64(compression).decode(text, self.extent)
            },
            _ => Err(MapIoError::invalid(
                format!("layer {id} data"),
                format!("does not match encoding '{encoding}'"),
            )),
        }
    }

    fn layer(&mut self, raw: JsonLayer) -> Result<Layer> {
        let id = raw.id.ok_or_else(|| MapIoError::missing("layer id"))?;
        let kind = match raw.kind.as_deref() {
            Some("tilelayer") => LayerKind::Tile(self.tile_data(&raw, id)?),
            Some("objectgroup") => LayerKind::Object(
                raw.objects
                    .unwrap_or_default()
                    .into_iter()
                    .map(|object| self.object(object))
                    .collect::<Result<_>>()?,
            ),
            Some("group") => LayerKind::Group(
                raw.layers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| self.layer(child))
                    .collect::<Result<_>>()?,
            ),
            Some(other) => return Err(MapIoError::unsupported("layer type", other)),
            None => return Err(MapIoError::missing(format!("layer {id} type"))),
        };

        Ok(Layer {
            id,
            meta: self.metadata(raw.name, raw.properties)?,
            opacity: raw.opacity,
            visible: raw.visible,
            kind,
        })
    }

    fn tileset(&self, raw: JsonTileset) -> Result<Tileset> {
        let mut tiles = BTreeMap::new();
        for tile in raw.tiles {
            let objects = tile
                .objectgroup
                .and_then(|group| group.objects)
                .unwrap_or_default()
                .into_iter()
                .map(|object| self.object(object))
                .collect::<Result<_>>()?;
            let data = TileData {
                frames: tile
                    .animation
                    .iter()
                    .map(|frame| AnimationFrame {
                        tile: frame.tileid,
                        duration_ms: frame.duration,
                    })
                    .collect(),
                objects,
                meta: self.metadata(String::new(), tile.properties)?,
            };
            tiles.insert(tile.id, data);
        }

        Ok(Tileset {
            meta: self.metadata(raw.name.unwrap_or_default(), raw.properties)?,
            image_path: PathBuf::from(raw.image.ok_or_else(|| MapIoError::missing("image"))?),
            image_width: raw
                .imagewidth
                .ok_or_else(|| MapIoError::missing("imagewidth"))?,
            image_height: raw
                .imageheight
                .ok_or_else(|| MapIoError::missing("imageheight"))?,
            tile_width: raw
                .tilewidth
                .ok_or_else(|| MapIoError::missing("tilewidth"))?,
            tile_height: raw
                .tileheight
                .ok_or_else(|| MapIoError::missing("tileheight"))?,
            margin: raw.margin.unwrap_or(0),
            spacing: raw.spacing.unwrap_or(0),
            tile_count: raw
                .tilecount
                .ok_or_else(|| MapIoError::missing("tilecount"))?,
            column_count: raw.columns.ok_or_else(|| MapIoError::missing("columns"))?,
            tiles,
        })
    }
}

impl JsonFormat {
    fn read_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        let raw: JsonMap = parse_document(&read_document(path)?, "map")?;
        if raw.infinite {
            return Err(MapIoError::unsupported("map layout", "infinite"));
        }

        let extent = Extent::new(
            raw.height.ok_or_else(|| MapIoError::missing("height"))?,
            raw.width.ok_or_else(|| MapIoError::missing("width"))?,
        );
        extent.checked_len()?;
        let mut reader = Reader {
            options,
            extent,
            tile_format: None,
        };

        let mut tilesets = Vec::with_capacity(raw.tilesets.len());
        for entry in raw.tilesets {
            let first_id = entry
                .firstgid
                .ok_or_else(|| MapIoError::missing("firstgid"))?;
            let reference = match entry.source.clone() {
                Some(source) => {
                    let stored = PathBuf::from(source);
                    let tileset = if options.resolve_tilesets {
                        let resolved = resolve_relative(path, &stored);
                        tracing::debug!(path = %resolved.display(), "loading external tileset");
                        Some(self.load_tileset(&resolved, options)?)
                    } else {
                        None
                    };
                    TilesetRef {
                        first_id,
                        source: TilesetSource::External(stored),
                        tileset,
                    }
                },
                None => TilesetRef::embedded(first_id, reader.tileset(entry)?),
            };
            tilesets.push(reference);
        }

        let layers = raw
            .layers
            .into_iter()
            .map(|layer| reader.layer(layer))
            .collect::<Result<Vec<_>>>()?;

        let mut tile_format = reader.tile_format.unwrap_or_default();
        if tile_format.compression == TileCompression::Zlib {
            tile_format.zlib_level = zlib_level(raw.compressionlevel)?;
        }

        let map = Map {
            orientation: raw
                .orientation
                .as_deref()
                .map_or(Ok(Orientation::Orthogonal), str::parse)?,
            extent,
            tile_width: raw
                .tilewidth
                .ok_or_else(|| MapIoError::missing("tilewidth"))?,
            tile_height: raw
                .tileheight
                .ok_or_else(|| MapIoError::missing("tileheight"))?,
            next_layer_id: raw
                .nextlayerid
                .ok_or_else(|| MapIoError::missing("nextlayerid"))?,
            next_object_id: raw
                .nextobjectid
                .ok_or_else(|| MapIoError::missing("nextobjectid"))?,
            tile_format,
            component_definitions: BTreeMap::new(),
            tilesets,
            layers,
            meta: reader.metadata(String::new(), raw.properties)?,
        };
        map.validate()?;
        Ok(map)
    }
}

struct Writer {
    format: TileFormat,
}

impl Writer {
    fn properties(meta: &Metadata) -> Vec<JsonProperty> {
        meta.properties
            .iter()
            .map(|(name, value)| JsonProperty {
                name: name.clone(),
                kind: Some(tiled_type(name, value).to_string()),
                value: attribute_to_json(value),
            })
            .collect()
    }

    fn object(object: &Object) -> JsonObject {
        JsonObject {
            id: object.id,
            name: object.meta.name.clone(),
            kind: object.tag.clone(),
            class: String::new(),
            x: object.pos[0],
            y: object.pos[1],
            width: object.size[0],
            height: object.size[1],
            rotation: 0.0,
            visible: object.visible,
            point: object.kind == ObjectKind::Point,
            ellipse: object.kind == ObjectKind::Ellipse,
            polygon: match &object.kind {
                ObjectKind::Polygon(points) => {
                    Some(points.iter().map(|&[x, y]| JsonPoint { x, y }).collect())
                },
                _ => None,
            },
            gid: object.tile,
            properties: Self::properties(&object.meta),
        }
    }

    fn layer(&self, layer: &Layer, extent: Extent) -> Result<JsonLayer> {
        let mut json = JsonLayer {
            id: Some(layer.id),
            name: layer.meta.name.clone(),
            opacity: layer.opacity,
            visible: layer.visible,
            properties: Self::properties(&layer.meta),
            ..Default::default()
        };

        match &layer.kind {
            LayerKind::Tile(tiles) => {
                json.kind = Some("tilelayer".to_string());
                json.width = Some(extent.cols);
                json.height = Some(extent.rows);
                json.data = Some(match self.format.encoding {
                    TileEncoding::Plain => {
                        Value::Array(tiles.as_slice().iter().map(|&id| Value::from(id)).collect())
                    },
                    TileEncoding::Base64 => {
                        json.encoding = Some("base64".to_string());
                        if self.format.compression != TileCompression::None {
                            json.compression = Some(self.format.compression.to_string());
                        }
                        Value::String(self.format.encode(tiles)?)
                    },
                });
            },
            LayerKind::Object(objects) => {
                json.kind = Some("objectgroup".to_string());
                json.draworder = Some("topdown".to_string());
                json.objects = Some(objects.iter().map(Self::object).collect());
            },
            LayerKind::Group(children) => {
                json.kind = Some("group".to_string());
                json.layers = Some(
                    children
                        .iter()
                        .map(|child| self.layer(child, extent))
                        .collect::<Result<_>>()?,
                );
            },
        }
        Ok(json)
    }

    fn tileset(tileset: &Tileset, first_id: Option<i32>, standalone: bool) -> JsonTileset {
        let tiles = tileset
            .tiles
            .iter()
            .filter(|(_, tile)| !tile.is_empty())
            .map(|(&id, tile)| JsonTile {
                id,
                animation: tile
                    .frames
                    .iter()
                    .map(|frame| JsonFrame {
                        tileid: frame.tile,
                        duration: frame.duration_ms,
                    })
                    .collect(),
                objectgroup: (!tile.objects.is_empty()).then(|| JsonLayer {
                    kind: Some("objectgroup".to_string()),
                    draworder: Some("index".to_string()),
                    objects: Some(tile.objects.iter().map(Self::object).collect()),
                    opacity: 1.0,
                    visible: true,
                    ..Default::default()
                }),
                properties: Self::properties(&tile.meta),
            })
            .collect();

        JsonTileset {
            firstgid: first_id,
            source: None,
            kind: standalone.then(|| "tileset".to_string()),
            name: Some(tileset.meta.name.clone()),
            columns: Some(tileset.column_count),
            tilewidth: Some(tileset.tile_width),
            tileheight: Some(tileset.tile_height),
            tilecount: Some(tileset.tile_count),
            image: Some(path_to_text(&tileset.image_path)),
            imagewidth: Some(tileset.image_width),
            imageheight: Some(tileset.image_height),
            margin: Some(tileset.margin),
            spacing: Some(tileset.spacing),
            tiledversion: standalone.then(|| TILED_VERSION.to_string()),
            version: standalone.then(|| Value::from(TILED_FORMAT_VERSION)),
            tiles,
            properties: Self::properties(&tileset.meta),
        }
    }

    fn map(&self, map: &Map, options: &WriteOptions) -> Result<JsonMap> {
        let tilesets = map
            .tilesets
            .iter()
            .map(|reference| match place_tileset(reference, options.tilesets, "json") {
                TilesetPlacement::Embed(tileset) => {
                    Self::tileset(&tileset, Some(reference.first_id), false)
                },
                external @ TilesetPlacement::External { .. } => JsonTileset {
                    firstgid: Some(reference.first_id),
                    source: external.source_text(),
                    ..Default::default()
                },
            })
            .collect();

        let compressionlevel = match (self.format.compression, self.format.zlib_level) {
            (TileCompression::Zlib, Some(level)) => level as i32,
            _ => -1,
        };

        Ok(JsonMap {
            kind: Some("map".to_string()),
            orientation: Some(map.orientation.to_string()),
            renderorder: Some("right-down".to_string()),
            width: Some(map.extent.cols),
            height: Some(map.extent.rows),
            tilewidth: Some(map.tile_width),
            tileheight: Some(map.tile_height),
            nextlayerid: Some(map.next_layer_id),
            nextobjectid: Some(map.next_object_id),
            infinite: false,
            compressionlevel: Some(compressionlevel),
            tiledversion: Some(TILED_VERSION.to_string()),
            version: Some(Value::from(TILED_FORMAT_VERSION)),
            tilesets,
            layers: map
                .layers
                .iter()
                .map(|layer| self.layer(layer, map.extent))
                .collect::<Result<_>>()?,
            properties: Self::properties(&map.meta),
        })
    }
}

impl MapFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json", "tmj"]
    }

    fn tileset_extension(&self) -> &'static str {
        "json"
    }

    fn claims_tileset_extension(&self, extension: &str) -> bool {
        matches!(extension, "json" | "tsj")
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        tracing::debug!(path = %path.display(), "parsing Tiled JSON map");
        self.read_map(path, options)
    }

    fn save_map(&self, map: &Map, path: &Path, options: &WriteOptions) -> Result<()> {
        map.validate()?;
        warn_dropped_components(self.name(), map);

        let writer = Writer {
            format: effective_tile_format(map, options),
        };
        let document = render(&writer.map(map, options)?, options.indent)?;

        save_with_tilesets(self, map, path, &document, options)
    }

    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<Tileset> {
        let raw: JsonTileset = parse_document(&read_document(path)?, "tileset")?;
        Reader {
            options,
            extent: Extent::default(),
            tile_format: None,
        }
        .tileset(raw)
    }

    fn render_tileset(&self, tileset: &Tileset, options: &WriteOptions) -> Result<String> {
        warn_dropped_tileset_components(self.name(), tileset);
        render(&Writer::tileset(tileset, None, true), options.indent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Color;

    fn load(text: &str) -> Result<Map> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.tmj");
        std::fs::write(&path, text).unwrap();
        JsonFormat.load_map(&path, &ReadOptions::default())
    }

    fn header(layers: &str) -> String {
        format!(
            r#"{{"type":"map","width":2,"height":2,"tilewidth":8,"tileheight":8,
                "nextlayerid":2,"nextobjectid":1,"tilesets":[],"layers":[{layers}]}}"#
        )
    }

    #[test]
    fn test_array_layer() {
        let map = load(&header(
            r#"{"id":1,"name":"ground","type":"tilelayer","width":2,"height":2,"data":[1,2,3,4]}"#,
        ))
        .unwrap();
        match &map.layers[0].kind {
            LayerKind::Tile(tiles) => assert_eq!(tiles.as_slice(), &[1, 2, 3, 4]),
            other => panic!("expected tile layer, got {other:?}"),
        }
        assert_eq!(map.tile_format, TileFormat::plain());
    }

    #[test]
    fn test_base64_layer_sets_tile_format() {
        let tiles = TileMatrix::from_rows(&[[1, 0], [0, 2]]).unwrap();
        let data = TileFormat::base64(TileCompression::Zstd).encode(&tiles).unwrap();
        let map = load(&header(&format!(
            r#"{{"id":1,"type":"tilelayer","encoding":"base64","compression":"zstd","data":"{data}"}}"#
        )))
        .unwrap();
        assert_eq!(map.tile_format, TileFormat::base64(TileCompression::Zstd));
    }

    #[test]
    fn test_gzip_rejected() {
        let err = load(&header(
            r#"{"id":1,"type":"tilelayer","encoding":"base64","compression":"gzip","data":""}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedValue { what: "compression", .. }));
    }

    #[test]
    fn test_wrong_root() {
        assert!(matches!(
            load(r#"{"type":"tileset"}"#).unwrap_err(),
            MapIoError::UnrecognizedRoot(_)
        ));
        assert!(matches!(load("[1, 2]").unwrap_err(), MapIoError::UnrecognizedRoot(_)));
        assert!(matches!(load("{").unwrap_err(), MapIoError::Parse { format: "JSON", .. }));
    }

    #[test]
    fn test_huge_extent_rejected() {
        let text = header(r#"{"id":1,"type":"tilelayer","data":[1,2,3,4]}"#)
            .replace(r#""width":2"#, r#""width":18446744073709551615"#);
        assert!(matches!(load(&text).unwrap_err(), MapIoError::InvalidExtent(_)));
    }

    #[test]
    fn test_compression_level_above_nine_rejected() {
        let encoded = TileFormat::base64(TileCompression::Zlib)
            .encode(&TileMatrix::new(Extent::new(2, 2)))
            .unwrap();
        let layer = format!(
            r#"{{"id":1,"type":"tilelayer","encoding":"base64","compression":"zlib","data":"{encoded}"}}"#
        );
        let text = header(&layer)
            .replace(r#""type":"map","#, r#""type":"map","compressionlevel":12,"#);
        assert!(matches!(load(&text).unwrap_err(), MapIoError::InvalidValue { .. }));

        let text = header(&layer)
            .replace(r#""type":"map","#, r#""type":"map","compressionlevel":6,"#);
        assert_eq!(load(&text).unwrap().tile_format.zlib_level, Some(6));
    }

    #[test]
    fn test_empty_polygon_round_trip() {
        let mut map = Map::new(Extent::new(1, 1), 8, 8);
        map.layers.push(Layer::object(
            1,
            "things",
            vec![Object::new(1, ObjectKind::Polygon(Vec::new()))],
        ));
        map.next_layer_id = 2;
        map.next_object_id = 2;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.tmj");
        JsonFormat.save_map(&map, &path, &WriteOptions::default()).unwrap();
        let loaded = JsonFormat.load_map(&path, &ReadOptions::default()).unwrap();
        assert_eq!(loaded.layers, map.layers);
    }

    #[test]
    fn test_infinite_rejected() {
        let text = header("").replace(r#""type":"map","#, r#""type":"map","infinite":true,"#);
        assert!(matches!(load(&text).unwrap_err(), MapIoError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_object_shapes() {
        let map = load(&header(
            r#"{"id":1,"type":"objectgroup","objects":[
                {"id":1,"point":true,"x":4,"y":4},
                {"id":2,"ellipse":true,"width":8,"height":4,"type":"enemy"},
                {"id":3,"polygon":[{"x":0,"y":0},{"x":8,"y":0},{"x":4,"y":8}]},
                {"id":4,"class":"door","width":8,"height":8}
            ]}"#,
        ))
        .unwrap();
        let LayerKind::Object(objects) = &map.layers[0].kind else {
            panic!("expected object layer");
        };
        assert_eq!(objects[0].kind, ObjectKind::Point);
        assert_eq!(objects[1].kind, ObjectKind::Ellipse);
        assert_eq!(objects[1].tag, "enemy");
        assert!(matches!(&objects[2].kind, ObjectKind::Polygon(points) if points.len() == 3));
        assert_eq!(objects[3].kind, ObjectKind::Rect);
        assert_eq!(objects[3].tag, "door");
    }

    #[test]
    fn test_properties() {
        let text = header("").replace(
            r#""layers":[]"#,
            r##""layers":[],"properties":[
                {"name":"tint","type":"color","value":"#ff102030"},
                {"name":"speed","type":"float","value":1.5},
                {"name":"boss","type":"object","value":12},
                {"name":"music","type":"file","value":"audio/theme.ogg"}
            ]"##,
        );
        let map = load(&text).unwrap();
        let props = &map.meta.properties;
        assert_eq!(props["tint"], Attribute::Color(Color::rgba(0x10, 0x20, 0x30, 0xff)));
        assert_eq!(props["speed"], Attribute::Float(1.5));
        assert_eq!(props["boss"], Attribute::Object(crate::ir::ObjectRef(12)));
        assert_eq!(props["music"], Attribute::Path(PathBuf::from("audio/theme.ogg")));
    }

    #[test]
    fn test_vector_property_degrades() {
        let mut map = Map::new(Extent::new(1, 1), 8, 8);
        map.layers.push(Layer::tile(1, "ground", TileMatrix::new(Extent::new(1, 1))));
        map.meta
            .properties
            .insert("spawn".to_string(), Attribute::Float2([1.5, 2.0]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        JsonFormat.save_map(&map, &path, &WriteOptions::default()).unwrap();
        let loaded = JsonFormat.load_map(&path, &ReadOptions::default()).unwrap();

        assert_eq!(
            loaded.meta.properties["spawn"],
            Attribute::String("1.5;2".to_string())
        );
    }

    #[test]
    fn test_indent_option() {
        let mut map = Map::new(Extent::new(1, 1), 8, 8);
        map.layers.push(Layer::tile(1, "ground", TileMatrix::new(Extent::new(1, 1))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        let options = WriteOptions {
            indent: 4,
            ..Default::default()
        };
        JsonFormat.save_map(&map, &path, &options).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"type\": \"map\""));
    }
}
