//! Tile asset emission: one raster in, one asset per tile out

use log::debug;
use rayon::prelude::*;

use super::address::{address, spatial_digits};
use super::slicer::{TileGrid, TileSpec, extract_tile};
use crate::asset::{AssetRef, AssetSink, Quad};
use crate::error::{Result, TilerError};
use crate::raster::PixelBuffer;

/// Where a raster sits in the pyramid
#[derive(Clone, Copy, Debug)]
pub struct RasterContext {
    pub page: usize,
    pub page_count: usize,
    pub levels: usize,
    pub depth: usize,
    pub density: f64,
    pub tile_size: u32,
}

/// Slice `raster` and hand every tile to `sink`. Tiles are emitted in parallel.
pub fn emit_raster(
    sink: &dyn AssetSink,
    raster: &PixelBuffer,
    ctx: &RasterContext,
) -> Result<Vec<AssetRef>> {
    let grid = TileGrid::for_raster(raster, ctx.tile_size);
    let digits = spatial_digits(ctx.levels, ctx.depth);
    if grid.bits() as usize > digits {
        return Err(TilerError::AddressCollision {
            address: String::new(),
            detail: format!(
                "page {} at depth {} needs a {}x{} grid but only {digits} digits are available",
                ctx.page,
                ctx.depth,
                grid.size(),
                grid.size()
            ),
        });
    }

    let tiles: Vec<TileSpec> = grid.tiles().collect();
    debug!(
        "Page {} depth {}: {}x{} raster, grid {}, {} tiles",
        ctx.page,
        ctx.depth,
        raster.width(),
        raster.height(),
        grid.size(),
        tiles.len()
    );

    tiles
        .par_iter()
        .map(|tile| emit_tile(sink, raster, ctx, tile))
        .collect()
}

fn emit_tile(
    sink: &dyn AssetSink,
    raster: &PixelBuffer,
    ctx: &RasterContext,
    tile: &TileSpec,
) -> Result<AssetRef> {
    let addr = address(
        ctx.page,
        ctx.page_count,
        ctx.levels,
        ctx.depth,
        tile.i,
        tile.j,
    )?;

    let texture =
        extract_tile(raster, tile.rect, ctx.tile_size).map_err(|source| {
            TilerError::Rasterization {
                page: ctx.page,
                density: ctx.density,
                source,
            }
        })?;
    let quad = Quad::for_tile(tile.rect, raster.height(), ctx.page);

    let mut asset = sink
        .begin_asset(addr)
        .with_name(format!("{}_{}_{}", ctx.page, tile.i, tile.j));
    asset.add_quad(quad, texture);
    Ok(sink.commit_asset(asset)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemorySink;

    fn ctx(page: usize, page_count: usize, levels: usize, depth: usize) -> RasterContext {
        RasterContext {
            page,
            page_count,
            levels,
            depth,
            density: 500.0,
            tile_size: 256,
        }
    }

    #[test]
    fn one_asset_per_tile() {
        let sink = MemorySink::default();
        let raster = PixelBuffer::filled(1000, 1, [0, 0, 0, 255]);
        let refs = emit_raster(&sink, &raster, &ctx(0, 1, 3, 0)).unwrap();

        let mut addresses: Vec<_> = refs.iter().map(|r| r.address.to_string()).collect();
        addresses.sort();
        assert_eq!(addresses, vec!["000", "001", "010", "011"]);
        assert_eq!(sink.tile_count(), 4);
        assert!(sink.textures_are_uniform(256));
    }

    #[test]
    fn page_prefix_leads_every_address() {
        let sink = MemorySink::default();
        let raster = PixelBuffer::filled(600, 300, [0, 0, 0, 255]);
        let refs = emit_raster(&sink, &raster, &ctx(2, 3, 3, 0)).unwrap();
        assert_eq!(refs.len(), 3 * 2);
        assert!(refs.iter().all(|r| r.address.as_str().starts_with('2')));
    }

    #[test]
    fn grid_too_large_for_depth_is_rejected() {
        let sink = MemorySink::default();
        let raster = PixelBuffer::filled(1024, 1024, [0, 0, 0, 255]);
        let err = emit_raster(&sink, &raster, &ctx(0, 1, 2, 1)).unwrap_err();
        assert!(matches!(err, TilerError::AddressCollision { .. }));
        assert_eq!(sink.tile_count(), 0);
    }

    #[test]
    fn quads_tile_the_page() {
        let sink = MemorySink::default();
        let raster = PixelBuffer::filled(700, 1500, [0, 0, 0, 255]);
        let refs = emit_raster(&sink, &raster, &ctx(0, 1, 4, 0)).unwrap();
        let area: f32 = refs
            .iter()
            .map(|r| (r.bounds.max[0] - r.bounds.min[0]) * (r.bounds.max[1] - r.bounds.min[1]))
            .sum();
        assert!((area - 700.0 / 1500.0).abs() < 1e-4);
    }
}
