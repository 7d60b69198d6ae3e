//! Span flood fill.
//!
//! Replaces the 4-connected region of equal tiles around an origin. The fill
//! works span by span: from each seed it scans left and right along the row,
//! replaces the whole span, then seeds the rows above and below once per run
//! of matching cells inside the span. Every cell is replaced at most once, so
//! the fill terminates on every finite grid and never needs a visited set.

use crate::error::{MapIoError, Result};
use crate::ir::{Extent, TileId, TileMatrix, TilePos};

/// Mutable grid of tiles that can be flood filled.
///
/// Implemented by [`TileMatrix`]; hosts can implement it for their own live
/// layer types.
pub trait TileGrid {
    /// Grid dimensions
    fn extent(&self) -> Extent;

    /// Tile at `pos`, `None` if out of bounds
    fn tile_at(&self, pos: TilePos) -> Option<TileId>;

    /// Replace the tile at `pos`, returning false if out of bounds
    fn set_tile(&mut self, pos: TilePos, id: TileId) -> bool;
}

impl TileGrid for TileMatrix {
    fn extent(&self) -> Extent {
        TileMatrix::extent(self)
    }

    fn tile_at(&self, pos: TilePos) -> Option<TileId> {
        self.get(pos)
    }

    fn set_tile(&mut self, pos: TilePos, id: TileId) -> bool {
        self.set(pos, id)
    }
}

/// Flood fill from `origin`, returning every position that changed.
///
/// Filling a region with the tile it already holds changes nothing and
/// returns an empty list.
pub fn flood_fill<G: TileGrid + ?Sized>(
    grid: &mut G,
    origin: TilePos,
    replacement: TileId,
) -> Result<Vec<TilePos>> {
    let extent = grid.extent();
    let target = grid.tile_at(origin).ok_or(MapIoError::OutOfBounds {
        row: origin.row,
        col: origin.col,
    })?;

    let mut affected = Vec::new();
    if target == replacement {
        return Ok(affected);
    }

    let matches = |grid: &G, row: usize, col: usize| {
        grid.tile_at(TilePos::new(row, col)) == Some(target)
    };

    let mut seeds = vec![origin];
    while let Some(seed) = seeds.pop() {
        if !matches(grid, seed.row, seed.col) {
            continue;
        }

        let mut left = seed.col;
        while left > 0 && matches(grid, seed.row, left - 1) {
            left -= 1;
        }
        let mut right = seed.col;
        while right + 1 < extent.cols && matches(grid, seed.row, right + 1) {
            right += 1;
        }

        for col in left..=right {
            let pos = TilePos::new(seed.row, col);
            grid.set_tile(pos, replacement);
            affected.push(pos);
        }

        let neighbours = [seed.row.checked_sub(1), Some(seed.row + 1)];
        for row in neighbours.into_iter().flatten().filter(|&r| r < extent.rows) {
            let mut in_run = false;
            for col in left..=right {
                let hit = matches(grid, row, col);
                if hit && !in_run {
                    seeds.push(TilePos::new(row, col));
                }
                in_run = hit;
            }
        }
    }

    tracing::debug!(
        row = origin.row,
        col = origin.col,
        replaced = affected.len(),
        "flood fill"
    );
    Ok(affected)
}
