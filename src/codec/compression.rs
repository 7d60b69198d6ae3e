//! Compression providers for tile data.
//!
//! | Provider              | Tag    | Level            |
//! |-----------------------|--------|------------------|
//! | [`NoCompression`]     | `none` | -                |
//! | [`ZlibCompression`]   | `zlib` | 0-9, or default  |
//! | [`ZstdCompression`]   | `zstd` | library default  |
//!
//! Zlib and Zstd refuse to decompress empty input and report header or magic
//! mismatches as [`MapIoError::Decompression`]. Compressing an empty buffer
//! still yields a valid (non-empty) stream, so every provider round-trips
//! empty input.
//!
//! Decoders that know their output size use
//! [`CompressionProvider::decompress_limited`], which stops reading one byte
//! past the limit instead of inflating the whole stream.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{MapIoError, Result};

/// Lowest accepted zlib level
pub const MIN_ZLIB_LEVEL: u32 = 0;

/// Highest accepted zlib level
pub const MAX_ZLIB_LEVEL: u32 = 9;

/// A reversible byte stream transformation
pub trait CompressionProvider: Send + Sync {
    /// Compress an arbitrary byte stream
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Inverse of [`CompressionProvider::compress`]
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decompress_limited(data, usize::MAX)
    }

    /// Decompress at most `limit + 1` bytes.
    ///
    /// A result longer than `limit` means the stream holds more data than
    /// the caller expects; the remainder is never inflated.
    fn decompress_limited(&self, data: &[u8], limit: usize) -> Result<Vec<u8>>;
}

fn read_limited(reader: impl Read, limit: usize, codec: &str) -> Result<Vec<u8>> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut out = Vec::new();
    reader
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|e| MapIoError::Decompression(format!("{codec}: {e}")))?;
    Ok(out)
}

/// Compression applied to base64 tile data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileCompression {
    /// Raw bytes
    #[default]
    None,
    /// zlib (deflate) stream
    Zlib,
    /// Zstandard frame
    Zstd,
}

impl TileCompression {
    /// Tag used by every textual format
    pub fn as_str(&self) -> &'static str {
        match self {
            TileCompression::None => "none",
            TileCompression::Zlib => "zlib",
            TileCompression::Zstd => "zstd",
        }
    }

    /// Build the provider for this mode
    ///
    /// `zlib_level` is ignored by every mode except [`TileCompression::Zlib`].
    pub fn provider(&self, zlib_level: Option<u32>) -> Result<Box<dyn CompressionProvider>> {
        Ok(match self {
            TileCompression::None => Box::new(NoCompression),
            TileCompression::Zlib => match zlib_level {
                Some(level) => Box::new(ZlibCompression::with_level(level)?),
                None => Box::new(ZlibCompression::new()),
            },
            TileCompression::Zstd => Box::new(ZstdCompression),
        })
    }

    /// All supported modes
    pub fn all() -> &'static [TileCompression] {
        &[
            TileCompression::None,
            TileCompression::Zlib,
            TileCompression::Zstd,
        ]
    }
}

impl fmt::Display for TileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileCompression {
    type Err = MapIoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "" => Ok(TileCompression::None),
            "zlib" => Ok(TileCompression::Zlib),
            "zstd" => Ok(TileCompression::Zstd),
            other => Err(MapIoError::unsupported("compression", other)),
        }
    }
}

/// Identity provider
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl CompressionProvider for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress_limited(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        Ok(data[..data.len().min(limit.saturating_add(1))].to_vec())
    }
}

/// zlib provider backed by `flate2`
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCompression {
    /// Compression level, `None` for the library default
    pub level: Option<u32>,
}

impl ZlibCompression {
    /// Create provider with the default level
    pub fn new() -> Self {
        Self::default()
    }

    /// Create provider with an explicit level (0-9)
    pub fn with_level(level: u32) -> Result<Self> {
        if !(MIN_ZLIB_LEVEL..=MAX_ZLIB_LEVEL).contains(&level) {
            return Err(MapIoError::invalid(
                "zlib-compression-level",
                format!("{level} is outside {MIN_ZLIB_LEVEL}..={MAX_ZLIB_LEVEL}"),
            ));
        }
        Ok(Self { level: Some(level) })
    }

    fn flate_level(&self) -> flate2::Compression {
        self.level
            .map_or_else(flate2::Compression::default, flate2::Compression::new)
    }
}

impl CompressionProvider for ZlibCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.flate_level());
        encoder
            .write_all(data)
            .map_err(|e| MapIoError::Compression(format!("zlib: {e}")))?;
        encoder
            .finish()
            .map_err(|e| MapIoError::Compression(format!("zlib: {e}")))
    }

    fn decompress_limited(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(MapIoError::Decompression("zlib: empty input".to_string()));
        }

        read_limited(ZlibDecoder::new(data), limit, "zlib")
    }
}

/// Zstandard provider
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCompression;

impl CompressionProvider for ZstdCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::encode_all(data, zstd::DEFAULT_COMPRESSION_LEVEL)
            .map_err(|e| MapIoError::Compression(format!("zstd: {e}")))
    }

    fn decompress_limited(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(MapIoError::Decompression("zstd: empty input".to_string()));
        }

        let decoder = zstd::stream::Decoder::with_buffer(data)
            .map_err(|e| MapIoError::Decompression(format!("zstd: {e}")))?;
        read_limited(decoder, limit, "zstd")
    }
}
