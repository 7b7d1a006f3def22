//! Asset serialization boundary: geometry, references and the sink trait

mod glb;
mod quad;

use std::fmt;

use crate::error::SerializationError;
use crate::pyramid::Address;
use crate::raster::PixelBuffer;

pub use glb::GlbWriter;
#[cfg(any(test, feature = "test-utils"))]
pub use glb::parse_glb;
pub use quad::{Aabb, PAGE_DEPTH_STEP, Quad, document_bounds, page_depth};

/// File name of the root group
pub const ROOT_ASSET_NAME: &str = "asset";
/// Extension of every renderable asset
pub const ASSET_EXTENSION: &str = "glb";

/// File name of the tile asset at `address`
#[must_use]
pub fn tile_file_name(address: &Address) -> String {
    format!("_{address}.{ASSET_EXTENSION}")
}

/// File name of the group at `prefix`; the root group is `asset.glb`
#[must_use]
pub fn group_file_name(prefix: &Address) -> String {
    if prefix.is_root() {
        format!("{ROOT_ASSET_NAME}.{ASSET_EXTENSION}")
    } else {
        format!("{prefix}.{ASSET_EXTENSION}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Tile,
    Group,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Tile => f.write_str("tile"),
            AssetKind::Group => f.write_str("group"),
        }
    }
}

/// Handle to a committed asset
#[derive(Clone, Debug, PartialEq)]
pub struct AssetRef {
    pub address: Address,
    pub kind: AssetKind,
    /// Path relative to the output directory
    pub uri: String,
    pub bounds: Aabb,
}

/// One textured quad of a tile asset
#[derive(Clone, Debug)]
pub struct TexturedQuad {
    pub quad: Quad,
    pub texture: PixelBuffer,
}

/// A tile asset under construction
#[derive(Debug)]
pub struct TileAssetBuilder {
    pub address: Address,
    /// Node name inside the asset
    pub name: String,
    pub quads: Vec<TexturedQuad>,
}

impl TileAssetBuilder {
    #[must_use]
    pub fn new(address: Address) -> Self {
        let name = address.to_string();
        Self {
            address,
            name,
            quads: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a quad; returns its index within the asset
    pub fn add_quad(&mut self, quad: Quad, texture: PixelBuffer) -> usize {
        self.quads.push(TexturedQuad { quad, texture });
        self.quads.len() - 1
    }

    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.quads
            .iter()
            .fold(Aabb::empty(), |acc, q| acc.union(&q.quad.bounds()))
    }
}

/// A group node under construction
#[derive(Debug)]
pub struct GroupBuilder {
    pub prefix: Address,
    /// Coarser-LOD tile standing in for the whole group, when one exists
    pub content: Option<AssetRef>,
    pub children: Vec<AssetRef>,
}

impl GroupBuilder {
    #[must_use]
    pub fn new(prefix: Address) -> Self {
        Self {
            prefix,
            content: None,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: AssetRef) {
        self.children.push(child);
    }

    pub fn set_content(&mut self, content: AssetRef) {
        self.content = Some(content);
    }

    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.children
            .iter()
            .chain(self.content.iter())
            .fold(Aabb::empty(), |acc, c| acc.union(&c.bounds))
    }
}

/// Persists tile and group assets.
///
/// Every asset is written to its own file, so implementations are called
/// concurrently from rayon workers.
pub trait AssetSink: Sync {
    fn begin_asset(&self, address: Address) -> TileAssetBuilder {
        TileAssetBuilder::new(address)
    }

    fn commit_asset(&self, asset: TileAssetBuilder) -> Result<AssetRef, SerializationError>;

    fn begin_group(&self, prefix: Address) -> GroupBuilder {
        GroupBuilder::new(prefix)
    }

    fn commit_group(&self, group: GroupBuilder) -> Result<AssetRef, SerializationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(tile_file_name(&Address::from("0213")), "_0213.glb");
        assert_eq!(group_file_name(&Address::from("02")), "02.glb");
        assert_eq!(group_file_name(&Address::root()), "asset.glb");
    }

    #[test]
    fn group_bounds_cover_children_and_content() {
        let child = |addr: &str, min: [f32; 3], max: [f32; 3]| AssetRef {
            address: Address::from(addr),
            kind: AssetKind::Tile,
            uri: tile_file_name(&Address::from(addr)),
            bounds: Aabb { min, max },
        };
        let mut group = GroupBuilder::new(Address::from("0"));
        group.add_child(child("00", [0.0, 0.5, 0.0], [0.5, 1.0, 0.0]));
        group.add_child(child("03", [0.5, 0.0, 0.0], [1.0, 0.5, 0.0]));
        let bounds = group.bounds();
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 1.0, 0.0]);
    }
}
