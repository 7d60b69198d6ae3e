//! Property and naming conventions shared by the Tiled JSON and XML formats.
//!
//! | IR type          | Tiled type | Value form         |
//! |------------------|------------|--------------------|
//! | string           | `string`   | text               |
//! | int              | `int`      | integer            |
//! | float            | `float`    | number             |
//! | bool             | `bool`     | `true` / `false`   |
//! | path             | `file`     | forward slashes    |
//! | color            | `color`    | `#AARRGGBB`        |
//! | object           | `object`   | object id          |
//! | int2..4 float2..4| `string`   | `a;b[;c[;d]]`      |
//!
//! Vector values have no Tiled counterpart and are written as strings, so
//! they load back as string properties. Components have no counterpart at all
//! and are dropped.

use std::path::PathBuf;

use crate::codec::compression::MAX_ZLIB_LEVEL;
use crate::codec::TileCompression;
use crate::config::ReadOptions;
use crate::error::{MapIoError, Result};
use crate::ir::{path_to_text, Attribute, Color, Map, Metadata, ObjectRef, Tileset};

/// Tiled version written into generated documents
pub const TILED_VERSION: &str = "1.9.2";

/// Tiled document format version
pub const TILED_FORMAT_VERSION: &str = "1.9";

/// Tiled type tag for an attribute, logging lossy projections
pub fn tiled_type(name: &str, value: &Attribute) -> &'static str {
    match value {
        Attribute::String(_) => "string",
        Attribute::Int(_) => "int",
        Attribute::Float(_) => "float",
        Attribute::Bool(_) => "bool",
        Attribute::Path(_) => "file",
        Attribute::Color(_) => "color",
        Attribute::Object(_) => "object",
        vector => {
            tracing::warn!(
                property = name,
                kind = %vector.attribute_type(),
                "vector property written as string"
            );
            "string"
        },
    }
}

/// Textual value in Tiled conventions
pub fn tiled_text(value: &Attribute) -> String {
    match value {
        Attribute::Color(color) => color.to_argb(),
        Attribute::Path(path) => path_to_text(path),
        other => other.to_text(),
    }
}

/// Parse a textual Tiled value of the given type.
///
/// Untyped values are strings, as in Tiled.
pub fn parse_tiled_text(kind: Option<&str>, text: &str) -> Result<Attribute> {
    let corrupt = |kind: &str| MapIoError::invalid(format!("{kind} property"), format!("'{text}'"));

    Ok(match kind.unwrap_or("string") {
        "string" => Attribute::String(text.to_string()),
        "int" => Attribute::Int(text.trim().parse().map_err(|_| corrupt("int"))?),
        "float" => Attribute::Float(text.trim().parse().map_err(|_| corrupt("float"))?),
        "bool" => match text.trim() {
            "true" => Attribute::Bool(true),
            "false" => Attribute::Bool(false),
            _ => return Err(corrupt("bool")),
        },
        "file" => Attribute::Path(PathBuf::from(text)),
        "color" => Attribute::Color(Color::from_argb(text).ok_or_else(|| corrupt("color"))?),
        "object" => Attribute::Object(ObjectRef(
            text.trim().parse().map_err(|_| corrupt("object"))?,
        )),
        other => return Err(MapIoError::unsupported("property type", other)),
    })
}

/// Tile compression from a Tiled `compression` tag.
///
/// Tiled also writes gzip, which has no provider here.
pub fn compression_tag(tag: Option<&str>) -> Result<TileCompression> {
    match tag {
        None | Some("") => Ok(TileCompression::None),
        Some("gzip") => Err(MapIoError::unsupported("compression", "gzip")),
        Some(other) => other.parse(),
    }
}

/// Zlib level from a Tiled `compressionlevel`.
///
/// Tiled writes -1 for the library default.
pub fn zlib_level(level: Option<i32>) -> Result<Option<u32>> {
    match level {
        None => Ok(None),
        Some(level) if level < 0 => Ok(None),
        Some(level) => {
            let level = level.unsigned_abs();
            if level > MAX_ZLIB_LEVEL {
                return Err(MapIoError::invalid(
                    "compressionlevel",
                    format!("{level} is above {MAX_ZLIB_LEVEL}"),
                ));
            }
            Ok(Some(level))
        },
    }
}

/// Apply the lenient property policy to a parse result.
///
/// Strict options propagate the error, lenient options keep the raw text as a
/// string property.
pub fn recover(
    options: &ReadOptions,
    name: &str,
    parsed: Result<Attribute>,
    raw: impl FnOnce() -> String,
) -> Result<Attribute> {
    match parsed {
        Ok(value) => Ok(value),
        Err(err) if !options.strict_properties => {
            tracing::warn!(property = name, "recovering property as string: {err}");
            Ok(Attribute::String(raw()))
        },
        Err(err) => Err(err),
    }
}

fn count_components(meta: &Metadata) -> usize {
    meta.components.len()
}

fn tileset_components(tileset: &Tileset) -> usize {
    count_components(&tileset.meta)
        + tileset
            .tiles
            .values()
            .map(|tile| {
                count_components(&tile.meta)
                    + tile
                        .objects
                        .iter()
                        .map(|o| count_components(&o.meta))
                        .sum::<usize>()
            })
            .sum::<usize>()
}

/// Log a warning if saving `map` drops component data
pub fn warn_dropped_components(format: &str, map: &Map) {
    let mut dropped = count_components(&map.meta);
    map.visit_layers(&mut |layer| {
        dropped += count_components(&layer.meta);
        if let crate::ir::LayerKind::Object(objects) = &layer.kind {
            dropped += objects.iter().map(|o| count_components(&o.meta)).sum::<usize>();
        }
    });
    dropped += map
        .tilesets
        .iter()
        .filter_map(|r| r.tileset.as_ref())
        .map(tileset_components)
        .sum::<usize>();

    if dropped > 0 || !map.component_definitions.is_empty() {
        tracing::warn!(
            format,
            dropped,
            definitions = map.component_definitions.len(),
            "component data is not representable and will be dropped"
        );
    }
}

/// Log a warning if saving `tileset` drops component data
pub fn warn_dropped_tileset_components(format: &str, tileset: &Tileset) {
    let dropped = tileset_components(tileset);
    if dropped > 0 {
        tracing::warn!(
            format,
            dropped,
            "component data is not representable and will be dropped"
        );
    }
}
