//! Tiled XML format (`.tmx` maps, `.tsx` tilesets).
//!
//! Documents are read into a small element tree first, which keeps the
//! mapping code independent of the event stream. Tile data may be stored as
//! `<tile gid="..."/>` children, CSV text, or base64 text with optional
//! `zlib` or `zstd` compression. Maps are written with CSV or base64 data.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::tiled::{
    compression_tag, parse_tiled_text, recover, tiled_text, tiled_type, warn_dropped_components,
    warn_dropped_tileset_components, zlib_level, TILED_FORMAT_VERSION, TILED_VERSION,
};
use super::{
    effective_tile_format, place_tileset, read_document, resolve_relative,
    save_with_tilesets, MapFormat, TilesetPlacement,
};
use crate::codec::tiles::{decode_list, encode_csv};
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::config::{ReadOptions, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{
    path_to_text, widen, AnimationFrame, Extent, Layer, LayerKind, Map, Metadata, Object,
    ObjectKind, Orientation, TileData, TileMatrix, Tileset, TilesetRef, TilesetSource,
};

/// The Tiled XML format
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormat;

fn xml_error(err: impl Display) -> MapIoError {
    MapIoError::Parse {
        format: "XML",
        message: err.to_string(),
    }
}

fn number(value: f32) -> String {
    widen(value).to_string()
}

/// A parsed or to-be-written XML element
#[derive(Debug, Default, Clone, PartialEq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Self::new(&String::from_utf8_lossy(start.name().as_ref()));
        for attribute in start.attributes() {
            let attribute = attribute.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|text| {
                text.trim().parse().map_err(|e: T::Err| {
                    MapIoError::invalid(format!("{}.{key}", self.name), format!("'{text}': {e}"))
                })
            })
            .transpose()
    }

    fn require<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parse(key)?
            .ok_or_else(|| MapIoError::missing(format!("{}.{key}", self.name)))
    }

    fn first(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn parse_tree(text: &str) -> Result<Element> {
    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    loop {
        let closed = match reader.read_event()? {
            Event::Start(start) => {
                stack.push(Element::open(&start)?);
                None
            },
            Event::Empty(start) => Some(Element::open(&start)?),
            Event::End(_) => stack.pop(),
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(xml_error)?);
                }
                None
            },
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
                None
            },
            Event::Eof => {
                return Err(xml_error("document ended before the root element closed"));
            },
            _ => None,
        };

        if let Some(element) = closed {
            match stack.last_mut() {
                Some(parent) => parent.children.push(element),
                None => return Ok(element),
            }
        }
    }
}

fn expect_root(root: &Element, name: &str) -> Result<()> {
    if root.name == name {
        Ok(())
    } else {
        Err(MapIoError::UnrecognizedRoot(format!(
            "expected <{name}>, found <{}>",
            root.name
        )))
    }
}

fn render(root: &Element, indent: usize) -> Result<String> {
    let mut writer = quick_xml::Writer::new_with_indent(Vec::new(), b' ', indent);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    emit(&mut writer, root)?;

    let mut text = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    text.push('\n');
    Ok(text)
}

fn emit(writer: &mut quick_xml::Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let start = BytesStart::new(element.name.as_str()).with_attributes(
        element
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );

    if element.children.is_empty() && element.text.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_error);
    }

    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(xml_error)?;
    }
    for child in &element.children {
        emit(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_error)
}

struct Reader<'a> {
    options: &'a ReadOptions,
    extent: Extent,
    tile_format: Option<TileFormat>,
}

impl Reader<'_> {
    fn metadata(&self, element: &Element) -> Result<Metadata> {
        let mut meta = Metadata::named(element.get("name").unwrap_or_default());
        let Some(properties) = element.first("properties") else {
            return Ok(meta);
        };

        for property in properties.all("property") {
            let name: String = property.require("name")?;
            let text = property.get("value").unwrap_or(&property.text);
            let parsed = parse_tiled_text(property.get("type"), text);
            let value = recover(self.options, &name, parsed, || text.to_string())?;
            meta.properties.insert(name, value);
        }
        Ok(meta)
    }

    fn object(&self, element: &Element) -> Result<Object> {
        let kind = if element.first("point").is_some() {
            ObjectKind::Point
        } else if element.first("ellipse").is_some() {
            ObjectKind::Ellipse
        } else if let Some(polygon) = element.first("polygon") {
            ObjectKind::Polygon(parse_points(polygon.get("points").unwrap_or_default())?)
        } else {
            ObjectKind::Rect
        };
        let tag = element
            .get("type")
            .or_else(|| element.get("class"))
            .unwrap_or_default();

        Ok(Object {
            id: element.parse("id")?,
            kind,
            pos: [
                element.parse("x")?.unwrap_or(0.0),
                element.parse("y")?.unwrap_or(0.0),
            ],
            size: [
                element.parse("width")?.unwrap_or(0.0),
                element.parse("height")?.unwrap_or(0.0),
            ],
            tile: element.parse("gid")?,
            tag: tag.to_string(),
            visible: element.parse::<u8>("visible")?.unwrap_or(1) != 0,
            meta: self.metadata(element)?,
        })
    }

    fn objects(&self, group: &Element) -> Result<Vec<Object>> {
        group.all("object").map(|object| self.object(object)).collect()
    }

    fn tile_data(&mut self, element: &Element, id: i32) -> Result<TileMatrix> {
        let width: Option<usize> = element.parse("width")?;
        let height: Option<usize> = element.parse("height")?;
        if width.is_some_and(|w| w != self.extent.cols)
            || height.is_some_and(|h| h != self.extent.rows)
        {
            tracing::warn!(layer = id, "tile layer size differs from map size");
        }

        let data = element
            .first("data")
            .ok_or_else(|| MapIoError::missing(format!("layer {id} data")))?;
        let compression = compression_tag(data.get("compression"))?;

        let (format, tiles) = match data.get("encoding") {
            None => {
                let gids = data
                    .all("tile")
                    .map(|tile| -> Result<i32> { Ok(tile.parse("gid")?.unwrap_or(0)) })
                    .collect::<Result<Vec<_>>>()?;
                (TileFormat::plain(), decode_list(gids, self.extent)?)
            },
            Some(encoding) => {
                let format = TileFormat {
                    encoding: encoding.parse()?,
                    compression,
                    zlib_level: None,
                };
                if format.encoding == TileEncoding::Plain && compression != TileCompression::None {
                    return Err(MapIoError::invalid(
                        format!("layer {id} data"),
                        "csv data cannot be compressed",
                    ));
                }
                (format, format.decode(&data.text, self.extent)?)
            },
        };

        self.tile_format.get_or_insert(format);
        Ok(tiles)
    }

    fn layer(&mut self, element: &Element) -> Result<Layer> {
        let id: i32 = element.require("id")?;
        let kind = match element.name.as_str() {
            "layer" => LayerKind::Tile(self.tile_data(element, id)?),
            "objectgroup" => LayerKind::Object(self.objects(element)?),
            "group" => LayerKind::Group(self.layers(element)?),
            other => return Err(MapIoError::unsupported("layer type", other)),
        };

        Ok(Layer {
            id,
            meta: self.metadata(element)?,
            opacity: element.parse("opacity")?.unwrap_or(1.0),
            visible: element.parse::<u8>("visible")?.unwrap_or(1) != 0,
            kind,
        })
    }

    fn layers(&mut self, parent: &Element) -> Result<Vec<Layer>> {
        let mut layers = Vec::new();
        for child in &parent.children {
            match child.name.as_str() {
                "layer" | "objectgroup" | "group" => layers.push(self.layer(child)?),
                "imagelayer" => return Err(MapIoError::unsupported("layer type", "imagelayer")),
                _ => {},
            }
        }
        Ok(layers)
    }

    fn tileset(&self, element: &Element) -> Result<Tileset> {
        let image = element
            .first("image")
            .ok_or_else(|| MapIoError::missing("tileset.image"))?;

        let mut tiles = BTreeMap::new();
        for tile in element.all("tile") {
            let id: i32 = tile.require("id")?;
            let frames = tile
                .first("animation")
                .map(|animation| {
                    animation
                        .all("frame")
                        .map(|frame| -> Result<AnimationFrame> {
                            Ok(AnimationFrame {
                                tile: frame.require("tileid")?,
                                duration_ms: frame.require("duration")?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            let objects = match tile.first("objectgroup") {
                Some(group) => self.objects(group)?,
                None => Vec::new(),
            };
            let mut meta = self.metadata(tile)?;
            meta.name.clear();
            tiles.insert(
                id,
                TileData {
                    frames,
                    objects,
                    meta,
                },
            );
        }

        Ok(Tileset {
            meta: self.metadata(element)?,
            image_path: PathBuf::from(image.require::<String>("source")?),
            image_width: image.require("width")?,
            image_height: image.require("height")?,
            tile_width: element.require("tilewidth")?,
            tile_height: element.require("tileheight")?,
            margin: element.parse("margin")?.unwrap_or(0),
            spacing: element.parse("spacing")?.unwrap_or(0),
            tile_count: element.require("tilecount")?,
            column_count: element.require("columns")?,
            tiles,
        })
    }
}

fn parse_points(text: &str) -> Result<Vec<[f32; 2]>> {
    text.split_whitespace()
        .map(|pair| -> Result<[f32; 2]> {
            let corrupt = || MapIoError::invalid("polygon.points", format!("'{pair}'"));
            let (x, y) = pair.split_once(',').ok_or_else(corrupt)?;
            Ok([
                x.parse().map_err(|_| corrupt())?,
                y.parse().map_err(|_| corrupt())?,
            ])
        })
        .collect()
}

impl XmlFormat {
    fn read_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        let root = parse_tree(&read_document(path)?)?;
        expect_root(&root, "map")?;
        if root.parse::<u8>("infinite")?.unwrap_or(0) != 0 {
            return Err(MapIoError::unsupported("map layout", "infinite"));
        }

        let extent = Extent::new(root.require("height")?, root.require("width")?);
        extent.checked_len()?;
        let mut reader = Reader {
            options,
            extent,
            tile_format: None,
        };

        let mut tilesets = Vec::new();
        for element in root.all("tileset") {
            let first_id: i32 = element.require("firstgid")?;
            let reference = match element.get("source") {
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
                None => TilesetRef::embedded(first_id, reader.tileset(element)?),
            };
            tilesets.push(reference);
        }

        let layers = reader.layers(&root)?;

        let mut tile_format = reader.tile_format.unwrap_or_default();
        if tile_format.compression == TileCompression::Zlib {
            tile_format.zlib_level = zlib_level(root.parse::<i32>("compressionlevel")?)?;
        }

        let mut meta = reader.metadata(&root)?;
        meta.name.clear();

        let map = Map {
            orientation: root
                .get("orientation")
                .map_or(Ok(Orientation::Orthogonal), str::parse)?,
            extent,
            tile_width: root.require("tilewidth")?,
            tile_height: root.require("tileheight")?,
            next_layer_id: root.require("nextlayerid")?,
            next_object_id: root.require("nextobjectid")?,
            tile_format,
            component_definitions: BTreeMap::new(),
            tilesets,
            layers,
            meta,
        };
        map.validate()?;
        Ok(map)
    }
}

struct Writer {
    format: TileFormat,
}

impl Writer {
    fn with_properties(element: Element, meta: &Metadata) -> Element {
        if meta.properties.is_empty() {
            return element;
        }

        let mut properties = Element::new("properties");
        for (name, value) in &meta.properties {
            let text = tiled_text(value);
            let mut property = Element::new("property")
                .with("name", name)
                .with("type", tiled_type(name, value));
            if text.contains('\n') {
                property.text = text;
            } else {
                property = property.with("value", text);
            }
            properties.children.push(property);
        }
        element.with_child(properties)
    }

    fn object(object: &Object) -> Element {
        let mut element = Element::new("object");
        if let Some(id) = object.id {
            element = element.with("id", id);
        }
        if !object.meta.name.is_empty() {
            element = element.with("name", &object.meta.name);
        }
        if !object.tag.is_empty() {
            element = element.with("type", &object.tag);
        }
        if let Some(gid) = object.tile {
            element = element.with("gid", gid);
        }
        element = element
            .with("x", number(object.pos[0]))
            .with("y", number(object.pos[1]));
        if object.kind != ObjectKind::Point {
            element = element
                .with("width", number(object.size[0]))
                .with("height", number(object.size[1]));
        }
        if !object.visible {
            element = element.with("visible", 0);
        }

        element = Self::with_properties(element, &object.meta);
        match &object.kind {
            ObjectKind::Point => element.with_child(Element::new("point")),
            ObjectKind::Ellipse => element.with_child(Element::new("ellipse")),
            ObjectKind::Polygon(points) => {
                let points = points
                    .iter()
                    .map(|&[x, y]| format!("{},{}", number(x), number(y)))
                    .collect::<Vec<_>>()
                    .join(" ");
                element.with_child(Element::new("polygon").with("points", points))
            },
            ObjectKind::Rect => element,
        }
    }

    fn data(&self, tiles: &TileMatrix) -> Result<Element> {
        Ok(match self.format.encoding {
            TileEncoding::Plain => Element {
                text: format!("\n{}\n", encode_csv(tiles)),
                ..Element::new("data").with("encoding", "csv")
            },
            TileEncoding::Base64 => {
                let mut data = Element::new("data").with("encoding", "base64");
                if self.format.compression != TileCompression::None {
                    data = data.with("compression", self.format.compression);
                }
                data.text = self.format.encode(tiles)?;
                data
            },
        })
    }

    fn layer(&self, layer: &Layer, extent: Extent) -> Result<Element> {
        let name = match &layer.kind {
            LayerKind::Tile(_) => "layer",
            LayerKind::Object(_) => "objectgroup",
            LayerKind::Group(_) => "group",
        };
        let mut element = Element::new(name)
            .with("id", layer.id)
            .with("name", &layer.meta.name);
        if let LayerKind::Tile(_) = layer.kind {
            element = element.with("width", extent.cols).with("height", extent.rows);
        }
        if layer.opacity != 1.0 {
            element = element.with("opacity", number(layer.opacity));
        }
        if !layer.visible {
            element = element.with("visible", 0);
        }

        element = Self::with_properties(element, &layer.meta);
        match &layer.kind {
            LayerKind::Tile(tiles) => element.children.push(self.data(tiles)?),
            LayerKind::Object(objects) => {
                element.children.extend(objects.iter().map(Self::object));
            },
            LayerKind::Group(children) => {
                for child in children {
                    element.children.push(self.layer(child, extent)?);
                }
            },
        }
        Ok(element)
    }

    fn tileset(tileset: &Tileset, first_id: Option<i32>) -> Element {
        let mut element = Element::new("tileset");
        match first_id {
            Some(first_id) => element = element.with("firstgid", first_id),
            None => {
                element = element
                    .with("version", TILED_FORMAT_VERSION)
                    .with("tiledversion", TILED_VERSION);
            },
        }
        element = element
            .with("name", &tileset.meta.name)
            .with("tilewidth", tileset.tile_width)
            .with("tileheight", tileset.tile_height)
            .with("spacing", tileset.spacing)
            .with("margin", tileset.margin)
            .with("tilecount", tileset.tile_count)
            .with("columns", tileset.column_count);
        element = Self::with_properties(element, &tileset.meta);
        element = element.with_child(
            Element::new("image")
                .with("source", path_to_text(&tileset.image_path))
                .with("width", tileset.image_width)
                .with("height", tileset.image_height),
        );

        for (&id, tile) in tileset.tiles.iter().filter(|(_, tile)| !tile.is_empty()) {
            let mut entry = Self::with_properties(Element::new("tile").with("id", id), &tile.meta);
            if !tile.objects.is_empty() {
                let mut group = Element::new("objectgroup").with("draworder", "index");
                group.children.extend(tile.objects.iter().map(Self::object));
                entry = entry.with_child(group);
            }
            if !tile.frames.is_empty() {
                let mut animation = Element::new("animation");
                animation.children.extend(tile.frames.iter().map(|frame| {
                    Element::new("frame")
                        .with("tileid", frame.tile)
                        .with("duration", frame.duration_ms)
                }));
                entry = entry.with_child(animation);
            }
            element.children.push(entry);
        }
        element
    }

    fn map(&self, map: &Map, options: &WriteOptions) -> Result<Element> {
        let mut element = Element::new("map")
            .with("version", TILED_FORMAT_VERSION)
            .with("tiledversion", TILED_VERSION)
            .with("orientation", map.orientation)
            .with("renderorder", "right-down")
            .with("width", map.extent.cols)
            .with("height", map.extent.rows)
            .with("tilewidth", map.tile_width)
            .with("tileheight", map.tile_height)
            .with("infinite", 0)
            .with("nextlayerid", map.next_layer_id)
            .with("nextobjectid", map.next_object_id);
        if let (TileCompression::Zlib, Some(level)) = (self.format.compression, self.format.zlib_level)
        {
            element = element.with("compressionlevel", level);
        }
        element = Self::with_properties(element, &map.meta);

        for reference in &map.tilesets {
            let entry = match place_tileset(reference, options.tilesets, "tsx") {
                TilesetPlacement::Embed(tileset) => {
                    Self::tileset(&tileset, Some(reference.first_id))
                },
                external @ TilesetPlacement::External { .. } => Element::new("tileset")
                    .with("firstgid", reference.first_id)
                    .with("source", external.source_text().unwrap_or_default()),
            };
            element.children.push(entry);
        }

        for layer in &map.layers {
            element.children.push(self.layer(layer, map.extent)?);
        }
        Ok(element)
    }
}

impl MapFormat for XmlFormat {
    fn name(&self) -> &'static str {
        "XML"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tmx", "xml"]
    }

    fn tileset_extension(&self) -> &'static str {
        "tsx"
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        tracing::debug!(path = %path.display(), "parsing Tiled XML map");
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
        let root = parse_tree(&read_document(path)?)?;
        expect_root(&root, "tileset")?;
        Reader {
            options,
            extent: Extent::default(),
            tile_format: None,
        }
        .tileset(&root)
    }

    fn render_tileset(&self, tileset: &Tileset, options: &WriteOptions) -> Result<String> {
        warn_dropped_tileset_components(self.name(), tileset);
        render(&Writer::tileset(tileset, None), options.indent)
    }
}
