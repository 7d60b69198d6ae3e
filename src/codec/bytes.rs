//! Byte-level primitives for tile data.
//!
//! Tile identifiers are persisted as 4-byte little-endian integers regardless
//! of host byte order.

use bytes::{Buf, BufMut};

use crate::error::{MapIoError, Result};

/// Width of one persisted tile identifier in bytes
pub const TILE_ID_WIDTH: usize = 4;

/// Byte order of a fixed-width integer on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first (used by every supported format)
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    /// Byte order of the running platform
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

/// Reverse the byte order of a 32-bit value.
pub const fn swap_i32(value: i32) -> i32 {
    value.swap_bytes()
}

/// Convert a native-order value to the given on-disk byte order.
pub const fn to_order(value: i32, order: ByteOrder) -> i32 {
    match order {
        ByteOrder::Little => value.to_le(),
        ByteOrder::Big => value.to_be(),
    }
}

/// Append a 32-bit integer in the given byte order.
pub fn put_i32(buf: &mut Vec<u8>, value: i32, order: ByteOrder) {
    match order {
        ByteOrder::Little => buf.put_i32_le(value),
        ByteOrder::Big => buf.put_i32(value),
    }
}

/// Read the 32-bit integer at `index` (in units of [`TILE_ID_WIDTH`]).
pub fn read_i32_at(data: &[u8], index: usize, order: ByteOrder) -> Option<i32> {
    let start = index.checked_mul(TILE_ID_WIDTH)?;
    let mut chunk = data.get(start..start.checked_add(TILE_ID_WIDTH)?)?;
    Some(match order {
        ByteOrder::Little => chunk.get_i32_le(),
        ByteOrder::Big => chunk.get_i32(),
    })
}

/// Serialize a sequence of identifiers into a contiguous byte stream.
pub fn i32s_to_bytes(values: &[i32], order: ByteOrder) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * TILE_ID_WIDTH);
    for &value in values {
        put_i32(&mut buf, value, order);
    }
    buf
}

/// Reinterpret a byte stream as a sequence of identifiers.
///
/// Fails when the stream is not a whole number of identifiers.
pub fn bytes_to_i32s(data: &[u8], order: ByteOrder) -> Result<Vec<i32>> {
    if data.len() % TILE_ID_WIDTH != 0 {
        return Err(MapIoError::MisalignedTileData(data.len()));
    }

    let mut reader = data;
    let mut values = Vec::with_capacity(data.len() / TILE_ID_WIDTH);
    while reader.has_remaining() {
        values.push(match order {
            ByteOrder::Little => reader.get_i32_le(),
            ByteOrder::Big => reader.get_i32(),
        });
    }

    Ok(values)
}
