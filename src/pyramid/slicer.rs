//! Tile grid computation and pixel extraction for one page raster

use crate::error::RasterizationError;
use crate::raster::{PixelBuffer, resample};

/// Pixel rectangle of a tile inside its source raster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One cell of the grid: column `i`, row `j`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSpec {
    pub i: u32,
    pub j: u32,
    pub rect: PixelRect,
}

/// Square power-of-two tile grid over a `width × height` raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    n: u32,
}

impl TileGrid {
    /// `n = 2^ceil(log2(ceil(maxDim / tileSize)))`
    #[must_use]
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        debug_assert!(tile_size > 0, "tile size must be positive");
        let max_dim = width.max(height).max(1);
        let tiles_per_side = max_dim.div_ceil(tile_size);
        Self {
            width,
            height,
            tile_size,
            n: tiles_per_side.next_power_of_two(),
        }
    }

    #[must_use]
    pub fn for_raster(raster: &PixelBuffer, tile_size: u32) -> Self {
        Self::new(raster.width(), raster.height(), tile_size)
    }

    /// Cells per side
    #[must_use]
    pub fn size(&self) -> u32 {
        self.n
    }

    /// Number of bits needed to address a cell on one axis
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.n.trailing_zeros()
    }

    /// Rectangle of cell `(i, j)`, or `None` when its origin lies outside the raster
    #[must_use]
    pub fn rect(&self, i: u32, j: u32) -> Option<PixelRect> {
        let x = i.checked_mul(self.tile_size)?;
        let y = j.checked_mul(self.tile_size)?;
        if i >= self.n || j >= self.n || x >= self.width || y >= self.height {
            return None;
        }
        Some(PixelRect {
            x,
            y,
            width: self.tile_size.min(self.width - x),
            height: self.tile_size.min(self.height - y),
        })
    }

    /// Lazily yields every existing tile, column-major like the grid is addressed
    pub fn tiles(&self) -> impl Iterator<Item = TileSpec> + '_ {
        (0..self.n).flat_map(move |i| {
            (0..self.n).filter_map(move |j| self.rect(i, j).map(|rect| TileSpec { i, j, rect }))
        })
    }
}

/// Copy a tile out of its raster and bring it to `tile_size × tile_size`.
pub fn extract_tile(
    raster: &PixelBuffer,
    rect: PixelRect,
    tile_size: u32,
) -> Result<PixelBuffer, RasterizationError> {
    let pixels = raster
        .crop(rect.x, rect.y, rect.width, rect.height)
        .ok_or_else(|| RasterizationError::generic(format!("tile {rect:?} outside raster")))?;

    if pixels.dimensions() == (tile_size, tile_size) {
        Ok(pixels)
    } else {
        resample(&pixels, tile_size, tile_size)
    }
}
