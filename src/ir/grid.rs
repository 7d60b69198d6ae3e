//! Dense tile grids.

use serde::{Deserialize, Serialize};

use crate::error::{MapIoError, Result};

/// Global tile identifier
pub type TileId = i32;

/// Tile index local to one tileset
pub type TileIndex = i32;

/// The empty tile
pub const EMPTY_TILE: TileId = 0;

/// Grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
}

impl Extent {
    /// Create extent
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells, saturating at `usize::MAX`
    pub const fn len(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Total number of cells, or an error when the grid could not be
    /// addressed as bytes.
    ///
    /// Extents read from documents go through this before any tile data is
    /// decoded.
    pub fn checked_len(&self) -> Result<usize> {
        self.rows
            .checked_mul(self.cols)
            .filter(|cells| cells.checked_mul(std::mem::size_of::<TileId>()).is_some())
            .ok_or_else(|| {
                MapIoError::InvalidExtent(format!(
                    "{}x{} tiles overflows the addressable size",
                    self.rows, self.cols
                ))
            })
    }

    /// True if the extent holds no cells
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// True if `pos` lies inside the extent
    pub const fn contains(&self, pos: TilePos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }
}

/// Position of a cell in a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
}

impl TilePos {
    /// Create position
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Position of the `index`th cell in row-major order
    pub const fn from_index(index: usize, cols: usize) -> Self {
        Self {
            row: index / cols,
            col: index % cols,
        }
    }
}

/// Row-major grid of tile identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileMatrix {
    extent: Extent,
    tiles: Vec<TileId>,
}

impl TileMatrix {
    /// Grid of empty tiles
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            tiles: vec![EMPTY_TILE; extent.len()],
        }
    }

    /// Wrap a row-major buffer, checking its length against the extent.
    pub fn from_vec(extent: Extent, tiles: Vec<TileId>) -> Result<Self> {
        if tiles.len() != extent.len() {
            return Err(MapIoError::TileCountMismatch {
                expected: extent.len(),
                actual: tiles.len(),
            });
        }
        Ok(Self { extent, tiles })
    }

    /// Build from nested rows; all rows must share one length.
    pub fn from_rows<R: AsRef<[TileId]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |row| row.as_ref().len());
        let mut tiles = Vec::with_capacity(rows.len() * cols);

        for (index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(MapIoError::invalid(
                    format!("row {index}"),
                    format!("expected {cols} columns, found {}", row.len()),
                ));
            }
            tiles.extend_from_slice(row);
        }

        Self::from_vec(Extent::new(rows.len(), cols), tiles)
    }

    /// Grid dimensions
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.extent.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.extent.cols
    }

    /// Tile at `pos`, if in bounds
    pub fn get(&self, pos: TilePos) -> Option<TileId> {
        if self.extent.contains(pos) {
            self.tiles.get(pos.row * self.extent.cols + pos.col).copied()
        } else {
            None
        }
    }

    /// Replace the tile at `pos`, returning false if out of bounds.
    pub fn set(&mut self, pos: TilePos, id: TileId) -> bool {
        if !self.extent.contains(pos) {
            return false;
        }
        let index = pos.row * self.extent.cols + pos.col;
        match self.tiles.get_mut(index) {
            Some(slot) => {
                *slot = id;
                true
            },
            None => false,
        }
    }

    /// Row-major view of all tiles
    pub fn as_slice(&self) -> &[TileId] {
        &self.tiles
    }

    /// Iterate over rows
    pub fn iter_rows(&self) -> impl Iterator<Item = &[TileId]> {
        let cols = self.extent.cols;
        (0..self.extent.rows).map(move |row| &self.tiles[row * cols..(row + 1) * cols])
    }

    /// Iterate over `(position, id)` pairs in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (TilePos, TileId)> + '_ {
        let cols = self.extent.cols;
        self.tiles
            .iter()
            .enumerate()
            .map(move |(index, &id)| (TilePos::from_index(index, cols), id))
    }

    /// Nested row representation
    pub fn to_rows(&self) -> Vec<Vec<TileId>> {
        self.iter_rows().map(<[TileId]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let matrix = TileMatrix::from_rows(&[[1, 2, 3], [4, 5, 6]]).unwrap();
        assert_eq!(matrix.extent(), Extent::new(2, 3));
        assert_eq!(matrix.get(TilePos::new(1, 0)), Some(4));
        assert_eq!(matrix.get(TilePos::new(2, 0)), None);
        assert_eq!(matrix.to_rows(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_huge_extent() {
        let huge = Extent::new(usize::MAX, 2);
        assert_eq!(huge.len(), usize::MAX);
        assert!(matches!(huge.checked_len(), Err(MapIoError::InvalidExtent(_))));
        assert!(Extent::new(usize::MAX / 2, 2).checked_len().is_err());
        assert_eq!(Extent::new(3, 4).checked_len().unwrap(), 12);

        let err = TileMatrix::from_vec(huge, vec![1, 2]).unwrap_err();
        assert!(matches!(err, MapIoError::TileCountMismatch { expected: usize::MAX, actual: 2 }));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows: Vec<Vec<TileId>> = vec![vec![1, 2], vec![3]];
        assert!(TileMatrix::from_rows(&rows).is_err());
    }

    #[test]
    fn test_empty_grid() {
        let matrix = TileMatrix::new(Extent::new(0, 0));
        assert_eq!(matrix.iter_rows().count(), 0);
        assert!(matrix.as_slice().is_empty());
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut matrix = TileMatrix::new(Extent::new(1, 1));
        assert!(matrix.set(TilePos::new(0, 0), 9));
        assert!(!matrix.set(TilePos::new(0, 1), 9));
        assert_eq!(matrix.as_slice(), &[9]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = TileMatrix::from_vec(Extent::new(2, 2), vec![0; 3]).unwrap_err();
        assert!(matches!(
            err,
            MapIoError::TileCountMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }
}
