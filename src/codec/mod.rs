//! Tile data codecs.
//!
//! Layered from the bottom up:
//!
//! | Module          | Responsibility                                   |
//! |-----------------|--------------------------------------------------|
//! | [`bytes`]       | Byte order and fixed-width integer access        |
//! | [`compression`] | Pluggable `none` / `zlib` / `zstd` providers      |
//! | [`tiles`]       | Tile grid to `plain` or `base64` text and back   |
//!
//! # Usage
//!
//! ```rust,ignore
//! use tilemap_io::codec::{TileCompression, TileFormat};
//! use tilemap_io::ir::TileMatrix;
//!
//! let grid = TileMatrix::from_rows(&[[1, 0], [0, 2]])?;
//! let format = TileFormat::base64(TileCompression::Zstd);
//!
//! let text = format.encode(&grid)?;
//! assert_eq!(format.decode(&text, grid.extent())?, grid);
//! ```

pub mod bytes;
pub mod compression;
pub mod tiles;

pub use compression::{
    CompressionProvider, NoCompression, TileCompression, ZlibCompression, ZstdCompression,
};
pub use tiles::{TileEncoding, TileFormat};
