//! Tile pyramid construction: density ladder, slicing, addressing, emission and grouping

mod address;
mod emit;
mod group;
mod ladder;
mod slicer;

pub use address::{
    Address, BRANCHING, address, page_prefix, page_prefix_digits, spatial_digits,
};
pub use emit::{RasterContext, emit_raster};
pub use group::{GroupTree, aggregate, inherit_content};
pub use ladder::{DensityLadder, PageState};
pub use slicer::{PixelRect, TileGrid, TileSpec, extract_tile};
