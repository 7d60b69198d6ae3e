//! Tile-grid codec.
//!
//! Converts a [`TileMatrix`] to and from its persisted cell representation.
//!
//! # Encodings
//!
//! ```text
//! plain:   1,0,0,2          one row per line, comma separated
//!          0,0,0,0
//!
//! base64:  base64( compress( le32(id_0) le32(id_1) ... ) )
//! ```
//!
//! Plain decoding accepts commas and whitespace interchangeably, so Tiled CSV
//! (trailing comma per row) and space separated data decode as well.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::bytes::{bytes_to_i32s, i32s_to_bytes, ByteOrder, TILE_ID_WIDTH};
use super::compression::TileCompression;
use crate::error::{MapIoError, Result};
use crate::ir::{Extent, TileId, TileMatrix};

/// Textual encoding of tile layer data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileEncoding {
    /// Delimited decimal identifiers
    #[default]
    Plain,
    /// Little-endian binary, optionally compressed, base64 encoded
    Base64,
}

impl TileEncoding {
    /// Tag used by the native format
    pub fn as_str(&self) -> &'static str {
        match self {
            TileEncoding::Plain => "plain",
            TileEncoding::Base64 => "base64",
        }
    }
}

impl fmt::Display for TileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileEncoding {
    type Err = MapIoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" | "csv" => Ok(TileEncoding::Plain),
            "base64" => Ok(TileEncoding::Base64),
            other => Err(MapIoError::unsupported("tile encoding", other)),
        }
    }
}

/// How a map persists its tile layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileFormat {
    /// Text encoding
    pub encoding: TileEncoding,
    /// Compression, only meaningful for base64
    pub compression: TileCompression,
    /// Explicit zlib level
    pub zlib_level: Option<u32>,
}

impl TileFormat {
    /// Plain, uncompressed tile data
    pub fn plain() -> Self {
        Self::default()
    }

    /// Base64 tile data with the given compression
    pub fn base64(compression: TileCompression) -> Self {
        Self {
            encoding: TileEncoding::Base64,
            compression,
            zlib_level: None,
        }
    }

    /// Set the zlib level
    pub fn with_zlib_level(mut self, level: u32) -> Self {
        self.zlib_level = Some(level);
        self
    }

    /// Encode a grid in this format
    pub fn encode(&self, matrix: &TileMatrix) -> Result<String> {
        match self.encoding {
            TileEncoding::Plain => Ok(encode_plain(matrix)),
            TileEncoding::Base64 => encode_base64(matrix, self.compression, self.zlib_level),
        }
    }

    /// Decode a grid stored in this format
    pub fn decode(&self, text: &str, extent: Extent) -> Result<TileMatrix> {
        match self.encoding {
            TileEncoding::Plain => decode_plain(text, extent),
            TileEncoding::Base64 => decode_base64(text, extent, self.compression),
        }
    }
}

/// Encode as comma separated rows, one row per line.
pub fn encode_plain(matrix: &TileMatrix) -> String {
    matrix
        .iter_rows()
        .map(|row| {
            row.iter()
                .map(TileId::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Encode as Tiled-style CSV, where every row but the last ends in a comma.
pub fn encode_csv(matrix: &TileMatrix) -> String {
    let mut out = String::new();
    let rows = matrix.rows();
    for (index, row) in matrix.iter_rows().enumerate() {
        let line = row
            .iter()
            .map(TileId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        if index + 1 < rows {
            out.push_str(",\n");
        }
    }
    out
}

/// Decode delimited identifiers into a grid of the given extent.
pub fn decode_plain(text: &str, extent: Extent) -> Result<TileMatrix> {
    let tiles = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<TileId>()
                .map_err(|e| MapIoError::invalid("tile data", format!("'{token}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    TileMatrix::from_vec(extent, tiles)
}

/// Decode an already separated list of identifiers (XML `<tile>` elements,
/// JSON arrays).
pub fn decode_list(tiles: Vec<TileId>, extent: Extent) -> Result<TileMatrix> {
    TileMatrix::from_vec(extent, tiles)
}

/// Encode as base64, compressing the little-endian byte stream first.
pub fn encode_base64(
    matrix: &TileMatrix,
    compression: TileCompression,
    zlib_level: Option<u32>,
) -> Result<String> {
    let raw = i32s_to_bytes(matrix.as_slice(), ByteOrder::Little);
    let compressed = compression.provider(zlib_level)?.compress(&raw)?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`encode_base64`].
pub fn decode_base64(
    text: &str,
    extent: Extent,
    compression: TileCompression,
) -> Result<TileMatrix> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = BASE64.decode(compact.as_bytes())?;

    let expected = extent.checked_len()?;
    let limit = expected * TILE_ID_WIDTH;
    let raw = compression
        .provider(None)?
        .decompress_limited(&decoded, limit)?;
    if raw.len() > limit {
        return Err(MapIoError::TileDataOverflow { expected });
    }

    if raw.len() % TILE_ID_WIDTH != 0 {
        return Err(MapIoError::MisalignedTileData(raw.len()));
    }

    let actual = raw.len() / TILE_ID_WIDTH;
    if actual != expected {
        return Err(MapIoError::TileCountMismatch { expected, actual });
    }

    TileMatrix::from_vec(extent, bytes_to_i32s(&raw, ByteOrder::Little)?)
}
