//! Native YAML format.
//!
//! ```yaml
//! version: 1
//! row-count: 4
//! column-count: 4
//! tile-width: 32
//! tile-height: 32
//! next-layer-id: 2
//! next-object-id: 1
//! tile-format:
//!   encoding: base64
//!   compression: zlib
//! tilesets:
//!   - first-global-id: 1
//!     path: terrain.yaml
//! layers:
//!   - name: ground
//!     id: 1
//!     type: tile-layer
//!     data: eJxjZGBgYIRiIGAEAAAxAAM=
//! ```
//!
//! Component instance values carry no type tag; their types come from the
//! map's `component-definitions`. Standalone tileset files are parsed without
//! definitions, so their component values are typed from the YAML scalar.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{
    effective_tile_format, place_tileset, read_document, resolve_relative,
    save_with_tilesets, MapFormat, TilesetPlacement,
};
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::config::{ReadOptions, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{
    path_to_text, widen, AnimationFrame, Attribute, AttributeMap, AttributeType, Extent, Layer,
    LayerKind, Map, Metadata, Object, ObjectKind, ObjectRef, Orientation, TileData, TileMatrix,
    Tileset, TilesetRef, TilesetSource,
};

/// Document version written to and accepted from native files
pub const FORMAT_VERSION: i32 = 1;

/// The native map format
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFormat;

fn default_version() -> i32 {
    FORMAT_VERSION
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMap {
    #[serde(default = "default_version")]
    version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orientation: Option<String>,
    row_count: Option<usize>,
    column_count: Option<usize>,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    next_layer_id: Option<i32>,
    next_object_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tile_format: Option<RawTileFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    component_definitions: Vec<RawComponentDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tilesets: Vec<RawTilesetRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    layers: Vec<RawLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<RawProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTileFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zlib_compression_level: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawComponentDef {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<RawDefAttribute>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDefAttribute {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawProperty {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawComponent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<RawComponentValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawComponentValue {
    name: String,
    value: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTilesetRef {
    first_global_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tileset: Option<RawTileset>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTileset {
    #[serde(default = "default_version")]
    version: i32,
    #[serde(default)]
    name: String,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    tile_count: Option<i32>,
    column_count: Option<i32>,
    image_path: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    #[serde(default, skip_serializing_if = "is_zero")]
    margin: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    spacing: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<RawTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<RawProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTile {
    id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<RawFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<RawObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<RawProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFrame {
    tile: i32,
    duration: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawLayer {
    #[serde(default)]
    name: String,
    id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<RawObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    layers: Vec<RawLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<RawProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i32>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    x: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    y: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    width: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tile: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    points: Vec<RawPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<RawProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawPoint {
    x: f32,
    y: f32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn is_zero_f32(value: &f32) -> bool {
    *value == 0.0
}

fn parse_document<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let value: Value = serde_yaml::from_str(text)?;
    if !value.is_mapping() {
        return Err(MapIoError::UnrecognizedRoot(
            "native document root must be a mapping".to_string(),
        ));
    }
    Ok(serde_yaml::from_value(value)?)
}

fn check_version(version: i32) -> Result<()> {
    if version == FORMAT_VERSION {
        Ok(())
    } else {
        Err(MapIoError::unsupported("version", version.to_string()))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_attribute(ty: AttributeType, value: &Value) -> Option<Attribute> {
    let int = || value.as_i64().and_then(|v| i32::try_from(v).ok());
    match ty {
        AttributeType::Int => int().map(Attribute::Int),
        AttributeType::Float => value.as_f64().map(|v| Attribute::Float(v as f32)),
        AttributeType::Bool => value.as_bool().map(Attribute::Bool),
        AttributeType::Object => int().map(|v| Attribute::Object(ObjectRef(v))),
        _ => Attribute::from_text(ty, &scalar_text(value)?).ok(),
    }
}

fn attribute_to_value(attribute: &Attribute) -> Value {
    match attribute {
        Attribute::Int(v) => Value::from(*v),
        Attribute::Float(v) => Value::from(widen(*v)),
        Attribute::Bool(v) => Value::Bool(*v),
        Attribute::Object(v) => Value::from(v.0),
        other => Value::String(other.to_text()),
    }
}

fn infer_type(value: &Value) -> AttributeType {
    match value {
        Value::Bool(_) => AttributeType::Bool,
        Value::Number(n) if n.is_i64() || n.is_u64() => AttributeType::Int,
        Value::Number(_) => AttributeType::Float,
        _ => AttributeType::String,
    }
}

/// Parsing state shared by one document
struct Reader<'a> {
    options: &'a ReadOptions,
    definitions: Option<&'a BTreeMap<String, AttributeMap>>,
}

impl Reader<'_> {
    fn metadata(
        &self,
        name: String,
        properties: Vec<RawProperty>,
        components: Vec<RawComponent>,
    ) -> Result<Metadata> {
        let mut meta = Metadata::named(name);
        for property in properties {
            if let Some(value) = self.property(&property)? {
                meta.properties.insert(property.name, value);
            }
        }
        for component in components {
            let values = self.component(&component)?;
            meta.components.insert(component.kind, values);
        }
        Ok(meta)
    }

    fn property(&self, property: &RawProperty) -> Result<Option<Attribute>> {
        let name = &property.name;
        let kind = property
            .kind
            .as_deref()
            .ok_or_else(|| MapIoError::missing(format!("property '{name}' type")))?;
        let value = property
            .value
            .as_ref()
            .ok_or_else(|| MapIoError::missing(format!("property '{name}' value")))?;

        let parsed = kind
            .parse::<AttributeType>()
            .and_then(|ty| {
                value_to_attribute(ty, value).ok_or_else(|| {
                    MapIoError::invalid(format!("property '{name}'"), format!("not a valid {ty}"))
                })
            });

        match parsed {
            Ok(attribute) => Ok(Some(attribute)),
            Err(err) if !self.options.strict_properties => {
                tracing::warn!(property = %name, "recovering property as string: {err}");
                Ok(scalar_text(value).map(Attribute::String))
            },
            Err(err) => Err(err),
        }
    }

    fn component(&self, component: &RawComponent) -> Result<AttributeMap> {
        let template = match self.definitions {
            Some(definitions) => Some(
                definitions
                    .get(&component.kind)
                    .ok_or_else(|| MapIoError::UnknownComponent(component.kind.clone()))?,
            ),
            None => None,
        };

        let mut values = template.cloned().unwrap_or_default();
        for entry in &component.values {
            let ty = match template {
                Some(template) => template
                    .get(&entry.name)
                    .map(Attribute::attribute_type)
                    .ok_or_else(|| {
                        MapIoError::invalid(
                            format!("component '{}'", component.kind),
                            format!("attribute '{}' is not defined", entry.name),
                        )
                    })?,
                None => infer_type(&entry.value),
            };
            let attribute = value_to_attribute(ty, &entry.value).ok_or_else(|| {
                MapIoError::invalid(
                    format!("component '{}' attribute '{}'", component.kind, entry.name),
                    format!("not a valid {ty}"),
                )
            })?;
            values.insert(entry.name.clone(), attribute);
        }
        Ok(values)
    }

    fn object(&self, raw: RawObject) -> Result<Object> {
        let kind = match raw.kind.as_deref() {
            Some("point") => ObjectKind::Point,
            Some("rect") => ObjectKind::Rect,
            Some("ellipse") => ObjectKind::Ellipse,
            Some("polygon") => ObjectKind::Polygon(raw.points.iter().map(|p| [p.x, p.y]).collect()),
            Some(other) => return Err(MapIoError::unsupported("object type", other)),
            None => return Err(MapIoError::missing("object type")),
        };

        Ok(Object {
            id: raw.id,
            kind,
            pos: [raw.x, raw.y],
            size: [raw.width, raw.height],
            tile: raw.tile,
            tag: raw.tag,
            visible: raw.visible.unwrap_or(true),
            meta: self.metadata(raw.name, raw.properties, raw.components)?,
        })
    }

    fn layer(&self, raw: RawLayer, extent: Extent, format: &TileFormat) -> Result<Layer> {
        let id = raw.id.ok_or_else(|| MapIoError::missing("layer id"))?;
        let kind = match raw.kind.as_deref() {
            Some("tile-layer") => {
                let data = raw
                    .data
                    .as_deref()
                    .ok_or_else(|| MapIoError::missing(format!("layer {id} data")))?;
                LayerKind::Tile(format.decode(data, extent)?)
            },
            Some("object-layer") => LayerKind::Object(
                raw.objects
                    .into_iter()
                    .map(|object| self.object(object))
                    .collect::<Result<_>>()?,
            ),
            Some("group-layer") => LayerKind::Group(
                raw.layers
                    .into_iter()
                    .map(|child| self.layer(child, extent, format))
                    .collect::<Result<_>>()?,
            ),
            Some(other) => return Err(MapIoError::unsupported("layer type", other)),
            None => return Err(MapIoError::missing(format!("layer {id} type"))),
        };

        Ok(Layer {
            id,
            meta: self.metadata(raw.name, raw.properties, raw.components)?,
            opacity: raw.opacity.unwrap_or(1.0),
            visible: raw.visible.unwrap_or(true),
            kind,
        })
    }

    fn tileset(&self, raw: RawTileset) -> Result<Tileset> {
        check_version(raw.version)?;

        let mut tiles = BTreeMap::new();
        for tile in raw.tiles {
            let data = TileData {
                frames: tile
                    .animation
                    .iter()
                    .map(|frame| AnimationFrame {
                        tile: frame.tile,
                        duration_ms: frame.duration,
                    })
                    .collect(),
                objects: tile
                    .objects
                    .into_iter()
                    .map(|object| self.object(object))
                    .collect::<Result<_>>()?,
                meta: self.metadata(String::new(), tile.properties, tile.components)?,
            };
            tiles.insert(tile.id, data);
        }

        Ok(Tileset {
            meta: self.metadata(raw.name, raw.properties, raw.components)?,
            image_path: PathBuf::from(
                raw.image_path
                    .ok_or_else(|| MapIoError::missing("image-path"))?,
            ),
            image_width: raw
                .image_width
                .ok_or_else(|| MapIoError::missing("image-width"))?,
            image_height: raw
                .image_height
                .ok_or_else(|| MapIoError::missing("image-height"))?,
            tile_width: raw
                .tile_width
                .ok_or_else(|| MapIoError::missing("tile-width"))?,
            tile_height: raw
                .tile_height
                .ok_or_else(|| MapIoError::missing("tile-height"))?,
            margin: raw.margin,
            spacing: raw.spacing,
            tile_count: raw
                .tile_count
                .ok_or_else(|| MapIoError::missing("tile-count"))?,
            column_count: raw
                .column_count
                .ok_or_else(|| MapIoError::missing("column-count"))?,
            tiles,
        })
    }

    fn tile_format(raw: Option<RawTileFormat>) -> Result<TileFormat> {
        let Some(raw) = raw else {
            return Ok(TileFormat::default());
        };

        let format = TileFormat {
            encoding: raw
                .encoding
                .as_deref()
                .map_or(Ok(TileEncoding::Plain), str::parse)?,
            compression: raw
                .compression
                .as_deref()
                .map_or(Ok(TileCompression::None), str::parse)?,
            zlib_level: raw.zlib_compression_level,
        };

        if format.encoding == TileEncoding::Plain && format.compression != TileCompression::None
        {
            return Err(MapIoError::invalid(
                "tile-format",
                "compression requires base64 encoding",
            ));
        }
        Ok(format)
    }
}

fn parse_definitions(raw: Vec<RawComponentDef>) -> Result<BTreeMap<String, AttributeMap>> {
    let mut definitions = BTreeMap::new();
    for definition in raw {
        let mut template = AttributeMap::new();
        for attribute in definition.attributes {
            let ty: AttributeType = attribute.kind.parse()?;
            let value = match &attribute.default {
                Some(value) => value_to_attribute(ty, value).ok_or_else(|| {
                    MapIoError::invalid(
                        format!("component '{}' attribute '{}'", definition.name, attribute.name),
                        format!("default is not a valid {ty}"),
                    )
                })?,
                None => ty.default_value(),
            };
            template.insert(attribute.name, value);
        }
        definitions.insert(definition.name, template);
    }
    Ok(definitions)
}

impl YamlFormat {
    fn read_tileset(
        &self,
        path: &Path,
        options: &ReadOptions,
        definitions: Option<&BTreeMap<String, AttributeMap>>,
    ) -> Result<Tileset> {
        let raw: RawTileset = parse_document(&read_document(path)?)?;
        Reader {
            options,
            definitions,
        }
        .tileset(raw)
    }

    fn read_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        let raw: RawMap = parse_document(&read_document(path)?)?;
        check_version(raw.version)?;

        let extent = Extent::new(
            raw.row_count.ok_or_else(|| MapIoError::missing("row-count"))?,
            raw.column_count
                .ok_or_else(|| MapIoError::missing("column-count"))?,
        );
        extent.checked_len()?;
        let tile_format = Reader::tile_format(raw.tile_format)?;
        let definitions = parse_definitions(raw.component_definitions)?;

        let reader = Reader {
            options,
            definitions: Some(&definitions),
        };

        let mut tilesets = Vec::with_capacity(raw.tilesets.len());
        for reference in raw.tilesets {
            let first_id = reference
                .first_global_id
                .ok_or_else(|| MapIoError::missing("first-global-id"))?;
            let entry = match (reference.path, reference.tileset) {
                (_, Some(inline)) => TilesetRef::embedded(first_id, reader.tileset(inline)?),
                (Some(stored), None) => {
                    let stored = PathBuf::from(stored);
                    let tileset = if options.resolve_tilesets {
                        let resolved = resolve_relative(path, &stored);
                        tracing::debug!(path = %resolved.display(), "loading external tileset");
                        Some(self.read_tileset(&resolved, options, Some(&definitions))?)
                    } else {
                        None
                    };
                    TilesetRef {
                        first_id,
                        source: TilesetSource::External(stored),
                        tileset,
                    }
                },
                (None, None) => return Err(MapIoError::missing("tileset path")),
            };
            tilesets.push(entry);
        }

        let layers = raw
            .layers
            .into_iter()
            .map(|layer| reader.layer(layer, extent, &tile_format))
            .collect::<Result<Vec<_>>>()?;
        let meta = reader.metadata(raw.name.unwrap_or_default(), raw.properties, raw.components)?;

        let map = Map {
            orientation: raw
                .orientation
                .as_deref()
                .map_or(Ok(Orientation::Orthogonal), str::parse)?,
            extent,
            tile_width: raw
                .tile_width
                .ok_or_else(|| MapIoError::missing("tile-width"))?,
            tile_height: raw
                .tile_height
                .ok_or_else(|| MapIoError::missing("tile-height"))?,
            next_layer_id: raw
                .next_layer_id
                .ok_or_else(|| MapIoError::missing("next-layer-id"))?,
            next_object_id: raw
                .next_object_id
                .ok_or_else(|| MapIoError::missing("next-object-id"))?,
            tile_format,
            component_definitions: definitions,
            tilesets,
            layers,
            meta,
        };
        map.validate()?;
        Ok(map)
    }
}

/// Emitting state shared by one document
struct Writer<'a> {
    options: &'a WriteOptions,
    format: TileFormat,
}

impl Writer<'_> {
    fn properties(meta: &Metadata) -> Vec<RawProperty> {
        meta.properties
            .iter()
            .map(|(name, value)| RawProperty {
                name: name.clone(),
                kind: Some(value.attribute_type().as_str().to_string()),
                value: Some(attribute_to_value(value)),
            })
            .collect()
    }

    fn components(meta: &Metadata) -> Vec<RawComponent> {
        meta.components
            .iter()
            .map(|(kind, values)| RawComponent {
                kind: kind.clone(),
                values: values
                    .iter()
                    .map(|(name, value)| RawComponentValue {
                        name: name.clone(),
                        value: attribute_to_value(value),
                    })
                    .collect(),
            })
            .collect()
    }

    fn object(object: &Object) -> RawObject {
        let points = match &object.kind {
            ObjectKind::Polygon(points) => {
                points.iter().map(|&[x, y]| RawPoint { x, y }).collect()
            },
            _ => Vec::new(),
        };

        RawObject {
            id: object.id,
            kind: Some(object.kind.as_str().to_string()),
            name: object.meta.name.clone(),
            tag: object.tag.clone(),
            visible: (!object.visible).then_some(false),
            x: object.pos[0],
            y: object.pos[1],
            width: object.size[0],
            height: object.size[1],
            tile: object.tile,
            points,
            properties: Self::properties(&object.meta),
            components: Self::components(&object.meta),
        }
    }

    fn tile_data(&self, tiles: &TileMatrix) -> Result<String> {
        if self.format.encoding == TileEncoding::Base64 {
            return self.format.encode(tiles);
        }

        let separator = if self.options.fold_tile_data { "\n" } else { " " };
        Ok(tiles
            .iter_rows()
            .map(|row| {
                row.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(separator))
    }

    fn layer(&self, layer: &Layer) -> Result<RawLayer> {
        let mut raw = RawLayer {
            name: layer.meta.name.clone(),
            id: Some(layer.id),
            opacity: (layer.opacity != 1.0).then_some(layer.opacity),
            visible: (!layer.visible).then_some(false),
            kind: Some(layer.kind.as_str().to_string()),
            data: None,
            objects: Vec::new(),
            layers: Vec::new(),
            properties: Self::properties(&layer.meta),
            components: Self::components(&layer.meta),
        };

        match &layer.kind {
            LayerKind::Tile(tiles) => raw.data = Some(self.tile_data(tiles)?),
            LayerKind::Object(objects) => raw.objects = objects.iter().map(Self::object).collect(),
            LayerKind::Group(children) => {
                raw.layers = children
                    .iter()
                    .map(|child| self.layer(child))
                    .collect::<Result<_>>()?;
            },
        }
        Ok(raw)
    }

    fn tileset(tileset: &Tileset) -> RawTileset {
        RawTileset {
            version: FORMAT_VERSION,
            name: tileset.meta.name.clone(),
            tile_width: Some(tileset.tile_width),
            tile_height: Some(tileset.tile_height),
            tile_count: Some(tileset.tile_count),
            column_count: Some(tileset.column_count),
            image_path: Some(path_to_text(&tileset.image_path)),
            image_width: Some(tileset.image_width),
            image_height: Some(tileset.image_height),
            margin: tileset.margin,
            spacing: tileset.spacing,
            tiles: tileset
                .tiles
                .iter()
                .filter(|(_, tile)| !tile.is_empty())
                .map(|(&id, tile)| RawTile {
                    id,
                    animation: tile
                        .frames
                        .iter()
                        .map(|frame| RawFrame {
                            tile: frame.tile,
                            duration: frame.duration_ms,
                        })
                        .collect(),
                    objects: tile.objects.iter().map(Self::object).collect(),
                    properties: Self::properties(&tile.meta),
                    components: Self::components(&tile.meta),
                })
                .collect(),
            properties: Self::properties(&tileset.meta),
            components: Self::components(&tileset.meta),
        }
    }

    fn map(&self, map: &Map) -> Result<RawMap> {
        let tile_format = (self.format != TileFormat::default()).then(|| RawTileFormat {
            encoding: Some(self.format.encoding.as_str().to_string()),
            compression: (self.format.compression != TileCompression::None)
                .then(|| self.format.compression.as_str().to_string()),
            zlib_compression_level: self.format.zlib_level,
        });

        let component_definitions = map
            .component_definitions
            .iter()
            .map(|(name, template)| RawComponentDef {
                name: name.clone(),
                attributes: template
                    .iter()
                    .map(|(attribute, value)| RawDefAttribute {
                        name: attribute.clone(),
                        kind: value.attribute_type().as_str().to_string(),
                        default: (!value.is_default()).then(|| attribute_to_value(value)),
                    })
                    .collect(),
            })
            .collect();

        let tilesets = map
            .tilesets
            .iter()
            .map(|reference| {
                let placement = place_tileset(reference, self.options.tilesets, "yaml");
                RawTilesetRef {
                    first_global_id: Some(reference.first_id),
                    path: placement.source_text(),
                    tileset: match placement {
                        TilesetPlacement::Embed(tileset) => Some(Self::tileset(&tileset)),
                        TilesetPlacement::External { .. } => None,
                    },
                }
            })
            .collect();

        Ok(RawMap {
            version: FORMAT_VERSION,
            name: (!map.meta.name.is_empty()).then(|| map.meta.name.clone()),
            orientation: (map.orientation != Orientation::Orthogonal)
                .then(|| map.orientation.as_str().to_string()),
            row_count: Some(map.extent.rows),
            column_count: Some(map.extent.cols),
            tile_width: Some(map.tile_width),
            tile_height: Some(map.tile_height),
            next_layer_id: Some(map.next_layer_id),
            next_object_id: Some(map.next_object_id),
            tile_format,
            component_definitions,
            tilesets,
            layers: map
                .layers
                .iter()
                .map(|layer| self.layer(layer))
                .collect::<Result<_>>()?,
            properties: Self::properties(&map.meta),
            components: Self::components(&map.meta),
        })
    }
}

impl MapFormat for YamlFormat {
    fn name(&self) -> &'static str {
        "YAML"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["yaml", "yml"]
    }

    fn tileset_extension(&self) -> &'static str {
        "yaml"
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        tracing::debug!(path = %path.display(), "parsing native map");
        self.read_map(path, options)
    }

    fn save_map(&self, map: &Map, path: &Path, options: &WriteOptions) -> Result<()> {
        map.validate()?;

        let writer = Writer {
            options,
            format: effective_tile_format(map, options),
        };
        let document = serde_yaml::to_string(&writer.map(map)?)?;

        save_with_tilesets(self, map, path, &document, options)
    }

    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<Tileset> {
        self.read_tileset(path, options, None)
    }

    fn render_tileset(&self, tileset: &Tileset, _options: &WriteOptions) -> Result<String> {
        Ok(serde_yaml::to_string(&Writer::tileset(tileset))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Color;

    fn load(text: &str) -> Result<Map> {
        load_with(text, &ReadOptions::default())
    }

    fn load_with(text: &str, options: &ReadOptions) -> Result<Map> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.yaml");
        std::fs::write(&path, text).unwrap();
        YamlFormat.load_map(&path, options)
    }

    const HEADER: &str = "\
version: 1
row-count: 2
column-count: 2
tile-width: 16
tile-height: 16
next-layer-id: 2
next-object-id: 1
";

    #[test]
    fn test_plain_layer() {
        let map = load(&format!(
            "{HEADER}layers:\n  - name: ground\n    id: 1\n    type: tile-layer\n    data: |\n      1 2\n      3 4\n"
        ))
        .unwrap();

        assert_eq!(map.layers.len(), 1);
        assert_eq!(map.layers[0].name(), "ground");
        match &map.layers[0].kind {
            LayerKind::Tile(tiles) => assert_eq!(tiles.to_rows(), vec![vec![1, 2], vec![3, 4]]),
            other => panic!("expected tile layer, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field() {
        let err = load("version: 1\nrow-count: 2\ncolumn-count: 2\n").unwrap_err();
        assert!(matches!(err, MapIoError::MissingField(_)));
    }

    #[test]
    fn test_unrecognized_root() {
        assert!(matches!(
            load("- just\n- a list\n").unwrap_err(),
            MapIoError::UnrecognizedRoot(_)
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            load("version: [1\n").unwrap_err(),
            MapIoError::Parse { format: "YAML", .. }
        ));
    }

    #[test]
    fn test_unknown_layer_type() {
        let err = load(&format!("{HEADER}layers:\n  - id: 1\n    type: image-layer\n")).unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedValue { what: "layer type", .. }));
    }

    #[test]
    fn test_unknown_compression() {
        let err = load(&format!(
            "{HEADER}tile-format:\n  encoding: base64\n  compression: lz4\n"
        ))
        .unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedValue { what: "compression", .. }));
    }

    #[test]
    fn test_tile_count_mismatch() {
        let err = load(&format!(
            "{HEADER}layers:\n  - id: 1\n    type: tile-layer\n    data: 1 2 3\n"
        ))
        .unwrap_err();
        assert!(matches!(err, MapIoError::TileCountMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_huge_extent_rejected() {
        let err = load(
            "version: 1
row-count: 18446744073709551615
column-count: 2
tile-width: 16
tile-height: 16
layers:
  - id: 1
    type: tile-layer
    data: 1 2
",
        )
        .unwrap_err();
        assert!(matches!(err, MapIoError::InvalidExtent(_)), "{err}");
    }

    #[test]
    fn test_tileset_ids_near_max() {
        let tileset = |first: i64| {
            format!(
                "  - first-global-id: {first}
    tileset:
      name: t{first}
      tile-width: 16
      tile-height: 16
      tile-count: 16
      column-count: 4
      image-path: t.png
      image-width: 64
      image-height: 64
"
            )
        };
        let doc = |tilesets: &str| {
            format!("{HEADER}tilesets:\n{tilesets}layers:\n  - id: 1\n    type: tile-layer\n    data: 0 0 0 0\n")
        };

        let err = load(&doc(&format!("{}{}", tileset(2_147_483_640), tileset(2_147_483_647))))
            .unwrap_err();
        assert!(matches!(err, MapIoError::DuplicateTileId(2_147_483_647)), "{err}");

        let err = load(&doc(&tileset(2_147_483_644))).unwrap_err();
        assert!(matches!(err, MapIoError::InvalidValue { .. }), "{err}");

        let map = load(&doc(&tileset(2_147_483_632))).unwrap();
        assert!(map.tilesets[0].contains(i32::MAX));
    }

    #[test]
    fn test_typed_properties() {
        let map = load(&format!(
            "{HEADER}properties:
  - name: spawn
    type: int2
    value: 3;4
  - name: tint
    type: color
    value: '#10203040'
  - name: speed
    type: float
    value: 2.5
  - name: target
    type: object
    value: 7
"
        ))
        .unwrap();

        let props = &map.meta.properties;
        assert_eq!(props["spawn"], Attribute::Int2([3, 4]));
        assert_eq!(props["tint"], Attribute::Color(Color::rgba(0x10, 0x20, 0x30, 0x40)));
        assert_eq!(props["speed"], Attribute::Float(2.5));
        assert_eq!(props["target"], Attribute::Object(ObjectRef(7)));
    }

    #[test]
    fn test_strict_and_lenient_properties() {
        let text = format!("{HEADER}properties:\n  - name: odd\n    type: quaternion\n    value: abc\n");

        let err = load(&text).unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedValue { what: "property type", .. }));

        let map = load_with(&text, &ReadOptions::lenient()).unwrap();
        assert_eq!(map.meta.properties["odd"], Attribute::String("abc".to_string()));

        let corrupt = format!("{HEADER}properties:\n  - name: n\n    type: int\n    value: twelve\n");
        assert!(matches!(load(&corrupt).unwrap_err(), MapIoError::InvalidValue { .. }));
    }

    #[test]
    fn test_components_use_definitions() {
        let map = load(&format!(
            "{HEADER}component-definitions:
  - name: Health
    attributes:
      - name: max
        type: int
        default: 100
      - name: regen
        type: float2
components:
  - type: Health
    values:
      - name: regen
        value: 0.5;1
"
        ))
        .unwrap();

        let health = &map.meta.components["Health"];
        assert_eq!(health["max"], Attribute::Int(100));
        assert_eq!(health["regen"], Attribute::Float2([0.5, 1.0]));
    }

    #[test]
    fn test_undefined_component() {
        let err = load(&format!("{HEADER}components:\n  - type: Ghost\n")).unwrap_err();
        assert!(matches!(err, MapIoError::UnknownComponent(ref name) if name == "Ghost"));
    }

    #[test]
    fn test_unsupported_version() {
        let err = load(&HEADER.replace("version: 1", "version: 2")).unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedValue { what: "version", .. }));
    }

    #[test]
    fn test_save_is_deterministic() {
        let mut map = Map::new(Extent::new(2, 2), 16, 16);
        map.layers.push(Layer::tile(
            1,
            "ground",
            TileMatrix::from_rows(&[[1, 2], [3, 4]]).unwrap(),
        ));
        map.meta.properties.insert("b".to_string(), Attribute::Bool(true));
        map.meta.properties.insert("a".to_string(), Attribute::Float(0.1));

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        YamlFormat.save_map(&map, &first, &WriteOptions::default()).unwrap();
        YamlFormat.save_map(&map, &second, &WriteOptions::default()).unwrap();

        let text = std::fs::read_to_string(&first).unwrap();
        assert_eq!(text, std::fs::read_to_string(&second).unwrap());
        assert!(text.find("name: a").unwrap() < text.find("name: b").unwrap());
        assert!(text.contains("0.1"));
        assert!(!text.contains("0.100000001"));
    }
}
