//! Test doubles: a synthetic rasterizer and an in-memory asset sink

use std::collections::HashMap;
use std::sync::Mutex;

use crate::asset::{
    AssetKind, AssetRef, AssetSink, GroupBuilder, TileAssetBuilder, group_file_name,
    tile_file_name,
};
use crate::error::{RasterizationError, SerializationError};
use crate::pyramid::Address;
use crate::raster::{PixelBuffer, Rasterizer};

/// Pages of fixed pixel size at a reference density, scaled linearly.
#[derive(Debug, Clone)]
pub struct SyntheticRasterizer {
    reference_density: f64,
    pages: Vec<(u32, u32)>,
    failing_page: Option<usize>,
}

impl SyntheticRasterizer {
    /// `pages` are pixel sizes at `reference_density`
    #[must_use]
    pub fn from_pixels(reference_density: f64, pages: &[(u32, u32)]) -> Self {
        Self {
            reference_density,
            pages: pages.to_vec(),
            failing_page: None,
        }
    }

    /// Make `rasterize` fail for `page`
    #[must_use]
    pub fn failing_on(mut self, page: usize) -> Self {
        self.failing_page = Some(page);
        self
    }

    fn scale(&self, px: u32, density: f64) -> u32 {
        let scaled = (f64::from(px) * density / self.reference_density).ceil();
        if scaled < 1.0 { 1 } else { scaled as u32 }
    }
}

impl Rasterizer for SyntheticRasterizer {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn measure(&self, page: usize, density: f64) -> Result<(u32, u32), RasterizationError> {
        let &(w, h) = self.pages.get(page).ok_or(RasterizationError::PageOutOfRange {
            page,
            page_count: self.pages.len(),
        })?;
        Ok((self.scale(w, density), self.scale(h, density)))
    }

    fn rasterize(&self, page: usize, density: f64) -> Result<PixelBuffer, RasterizationError> {
        if self.failing_page == Some(page) {
            return Err(RasterizationError::generic(format!("page {page} is corrupt")));
        }
        let (w, h) = self.measure(page, density)?;
        let shade = (page * 40 % 256) as u8;
        Ok(PixelBuffer::filled(w, h, [shade, 255 - shade, 128, 255]))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedTile {
    pub address: Address,
    pub name: String,
    pub texture_sizes: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct RecordedGroup {
    pub prefix: Address,
    pub content: Option<Address>,
    pub children: Vec<Address>,
}

/// Records commits instead of writing files
#[derive(Debug, Default)]
pub struct MemorySink {
    tiles: Mutex<Vec<RecordedTile>>,
    groups: Mutex<HashMap<Address, RecordedGroup>>,
}

impl MemorySink {
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn tiles(&self) -> Vec<RecordedTile> {
        self.tiles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn group(&self, prefix: &Address) -> Option<RecordedGroup> {
        self.groups
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(prefix)
            .cloned()
    }

    #[must_use]
    pub fn group_content(&self, prefix: &Address) -> Option<Address> {
        self.group(prefix).and_then(|g| g.content)
    }

    /// Every texture handed over is `size × size`
    #[must_use]
    pub fn textures_are_uniform(&self, size: u32) -> bool {
        self.tiles()
            .iter()
            .flat_map(|t| t.texture_sizes.iter())
            .all(|&dims| dims == (size, size))
    }
}

impl AssetSink for MemorySink {
    fn commit_asset(&self, asset: TileAssetBuilder) -> Result<AssetRef, SerializationError> {
        if asset.quads.is_empty() {
            return Err(SerializationError::EmptyAsset {
                address: asset.address.to_string(),
            });
        }
        let bounds = asset.bounds();
        let recorded = RecordedTile {
            address: asset.address.clone(),
            name: asset.name.clone(),
            texture_sizes: asset.quads.iter().map(|q| q.texture.dimensions()).collect(),
        };
        self.tiles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(recorded);

        Ok(AssetRef {
            uri: tile_file_name(&asset.address),
            address: asset.address,
            kind: AssetKind::Tile,
            bounds,
        })
    }

    fn commit_group(&self, group: GroupBuilder) -> Result<AssetRef, SerializationError> {
        let bounds = group.bounds();
        let recorded = RecordedGroup {
            prefix: group.prefix.clone(),
            content: group.content.as_ref().map(|c| c.address.clone()),
            children: group.children.iter().map(|c| c.address.clone()).collect(),
        };
        self.groups
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(group.prefix.clone(), recorded);

        Ok(AssetRef {
            uri: group_file_name(&group.prefix),
            address: group.prefix,
            kind: AssetKind::Group,
            bounds,
        })
    }
}
