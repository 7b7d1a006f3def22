//! Binary glTF writer for tile and group assets

use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::debug;
use serde_json::{Value, json};

use super::{
    AssetKind, AssetRef, AssetSink, GroupBuilder, Quad, TileAssetBuilder, group_file_name,
    tile_file_name,
};
use crate::error::SerializationError;
use crate::raster::PixelBuffer;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const FLOAT: u32 = 5126;
const UNSIGNED_SHORT: u32 = 5123;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const LINEAR: u32 = 9729;
const CLAMP_TO_EDGE: u32 = 33071;
const TRIANGLES: u32 = 4;

/// position (3) + uv (2)
const VERTEX_STRIDE: usize = 5 * 4;

const GENERATOR: &str = concat!("pdf-pyramid ", env!("CARGO_PKG_VERSION"));

/// Writes every asset as a `.glb` file into one output directory
#[derive(Debug, Clone)]
pub struct GlbWriter {
    output_dir: PathBuf,
}

impl GlbWriter {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), SerializationError> {
        let path = self.output_dir.join(file_name);
        fs::write(&path, bytes).map_err(|source| SerializationError::Write { path, source })
    }
}

impl AssetSink for GlbWriter {
    fn commit_asset(&self, asset: TileAssetBuilder) -> Result<AssetRef, SerializationError> {
        if asset.quads.is_empty() {
            return Err(SerializationError::EmptyAsset {
                address: asset.address.to_string(),
            });
        }

        let bounds = asset.bounds();
        let uri = tile_file_name(&asset.address);
        let bytes = encode_tile(&asset)?;
        self.write(&uri, &bytes)?;
        debug!("Wrote {uri} ({} bytes)", bytes.len());

        Ok(AssetRef {
            address: asset.address,
            kind: AssetKind::Tile,
            uri,
            bounds,
        })
    }

    fn commit_group(&self, group: GroupBuilder) -> Result<AssetRef, SerializationError> {
        let bounds = group.bounds();
        let uri = group_file_name(&group.prefix);
        let bytes = encode_group(&group)?;
        self.write(&uri, &bytes)?;
        debug!(
            "Wrote group {uri} with {} children",
            group.children.len()
        );

        Ok(AssetRef {
            address: group.prefix,
            kind: AssetKind::Group,
            uri,
            bounds,
        })
    }
}

/// PNG-encode an RGBA texture
pub(crate) fn encode_png(texture: &PixelBuffer) -> Result<Vec<u8>, SerializationError> {
    let (width, height) = texture.dimensions();
    let img = RgbaImage::from_raw(width, height, texture.as_bytes().to_vec()).ok_or_else(|| {
        image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        ))
    })?;
    let mut png_data = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;
    Ok(png_data)
}

/// Accumulates the BIN chunk and the JSON arrays that index into it
#[derive(Default)]
struct GltfParts {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    images: Vec<Value>,
    textures: Vec<Value>,
    materials: Vec<Value>,
    meshes: Vec<Value>,
    nodes: Vec<Value>,
}

impl GltfParts {
    fn push_view(&mut self, data: &[u8], stride: Option<usize>, target: Option<u32>) -> usize {
        pad_to_four(&mut self.bin, 0);
        let offset = self.bin.len();
        self.bin.extend_from_slice(data);

        let mut view = json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": data.len(),
        });
        if let Some(stride) = stride {
            view["byteStride"] = json!(stride);
        }
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.buffer_views.push(view);
        self.buffer_views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn add_quad(&mut self, name: &str, quad: &Quad, png: &[u8]) {
        let mut vertices = Vec::with_capacity(4 * VERTEX_STRIDE);
        for (pos, uv) in quad.positions.iter().zip(quad.uvs.iter()) {
            for v in pos.iter().chain(uv.iter()) {
                vertices.extend_from_slice(&v.to_le_bytes());
            }
        }
        let mut indices = Vec::with_capacity(Quad::INDICES.len() * 2);
        for i in Quad::INDICES {
            indices.extend_from_slice(&i.to_le_bytes());
        }

        let vertex_view = self.push_view(&vertices, Some(VERTEX_STRIDE), Some(ARRAY_BUFFER));
        let index_view = self.push_view(&indices, None, Some(ELEMENT_ARRAY_BUFFER));
        let image_view = self.push_view(png, None, None);

        let bounds = quad.bounds();
        let position = self.push_accessor(json!({
            "bufferView": vertex_view,
            "byteOffset": 0,
            "componentType": FLOAT,
            "count": 4,
            "type": "VEC3",
            "min": bounds.min,
            "max": bounds.max,
        }));
        let uv = self.push_accessor(json!({
            "bufferView": vertex_view,
            "byteOffset": 12,
            "componentType": FLOAT,
            "count": 4,
            "type": "VEC2",
        }));
        let index = self.push_accessor(json!({
            "bufferView": index_view,
            "componentType": UNSIGNED_SHORT,
            "count": Quad::INDICES.len(),
            "type": "SCALAR",
        }));

        self.images.push(json!({ "mimeType": "image/png", "bufferView": image_view }));
        let image = self.images.len() - 1;
        self.textures.push(json!({ "source": image, "sampler": 0 }));
        let texture = self.textures.len() - 1;

        self.materials.push(json!({
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 1.0, 1.0, 1.0],
                "baseColorTexture": { "index": texture },
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
            "alphaMode": "BLEND",
            "doubleSided": true,
            "extensions": { "KHR_materials_unlit": {} },
        }));
        let material = self.materials.len() - 1;

        self.meshes.push(json!({
            "primitives": [{
                "attributes": { "POSITION": position, "TEXCOORD_0": uv },
                "indices": index,
                "material": material,
                "mode": TRIANGLES,
            }]
        }));
        let mesh = self.meshes.len() - 1;
        self.nodes.push(json!({ "name": name, "mesh": mesh }));
    }
}

fn encode_tile(asset: &TileAssetBuilder) -> Result<Vec<u8>, SerializationError> {
    let mut parts = GltfParts::default();
    for (k, textured) in asset.quads.iter().enumerate() {
        let png = encode_png(&textured.texture)?;
        let name = if k == 0 {
            asset.name.clone()
        } else {
            format!("{}_{k}", asset.name)
        };
        parts.add_quad(&name, &textured.quad, &png);
    }
    pad_to_four(&mut parts.bin, 0);

    let node_ids: Vec<usize> = (0..parts.nodes.len()).collect();
    let doc = json!({
        "asset": {
            "version": "2.0",
            "generator": GENERATOR,
            "extras": { "address": asset.address.as_str() },
        },
        "extensionsUsed": ["KHR_materials_unlit"],
        "scene": 0,
        "scenes": [{ "nodes": node_ids }],
        "nodes": parts.nodes,
        "meshes": parts.meshes,
        "materials": parts.materials,
        "textures": parts.textures,
        "samplers": [{
            "magFilter": LINEAR,
            "minFilter": LINEAR,
            "wrapS": CLAMP_TO_EDGE,
            "wrapT": CLAMP_TO_EDGE,
        }],
        "images": parts.images,
        "accessors": parts.accessors,
        "bufferViews": parts.buffer_views,
        "buffers": [{ "byteLength": parts.bin.len() }],
    });

    assemble_glb(&serde_json::to_vec(&doc)?, Some(&parts.bin))
}

fn encode_group(group: &GroupBuilder) -> Result<Vec<u8>, SerializationError> {
    let bounds = group.bounds();
    let mut nodes = Vec::with_capacity(group.children.len() + 1);

    if let Some(content) = &group.content {
        nodes.push(json!({
            "name": format!("content_{}", content.address),
            "extras": {
                "uri": content.uri,
                "role": "content",
                "bounds": content.bounds,
            },
        }));
    }
    for child in &group.children {
        nodes.push(json!({
            "name": child.address.as_str(),
            "extras": {
                "uri": child.uri,
                "role": child.kind.to_string(),
                "bounds": child.bounds,
            },
        }));
    }

    let node_ids: Vec<usize> = (0..nodes.len()).collect();
    let doc = json!({
        "asset": {
            "version": "2.0",
            "generator": GENERATOR,
            "extras": {
                "prefix": group.prefix.as_str(),
                "bounds": bounds,
            },
        },
        "scene": 0,
        "scenes": [{ "nodes": node_ids }],
        "nodes": nodes,
    });

    assemble_glb(&serde_json::to_vec(&doc)?, None)
}

fn pad_to_four(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % 4 != 0 {
        buf.push(fill);
    }
}

/// 12-byte header, JSON chunk padded with spaces, optional BIN chunk padded with zeros
fn assemble_glb(json_bytes: &[u8], bin: Option<&[u8]>) -> Result<Vec<u8>, SerializationError> {
    let mut json_chunk = json_bytes.to_vec();
    pad_to_four(&mut json_chunk, b' ');

    let bin_chunk = bin.map(|b| {
        let mut b = b.to_vec();
        pad_to_four(&mut b, 0);
        b
    });

    let mut total = 12 + 8 + json_chunk.len();
    if let Some(b) = &bin_chunk {
        total += 8 + b.len();
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);

    if let Some(b) = bin_chunk {
        out.extend_from_slice(&(b.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&b);
    }

    Ok(out)
}

/// Split a GLB into its JSON document and BIN chunk
#[cfg(any(test, feature = "test-utils"))]
pub fn parse_glb(bytes: &[u8]) -> Option<(Value, Option<Vec<u8>>)> {
    let read_u32 = |at: usize| -> Option<u32> {
        bytes
            .get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };
    if read_u32(0)? != GLB_MAGIC || read_u32(4)? != GLB_VERSION {
        return None;
    }
    if read_u32(8)? as usize != bytes.len() {
        return None;
    }

    let json_len = read_u32(12)? as usize;
    if read_u32(16)? != CHUNK_JSON {
        return None;
    }
    let json: Value = serde_json::from_slice(bytes.get(20..20 + json_len)?).ok()?;

    let bin_at = 20 + json_len;
    let bin = if bin_at < bytes.len() {
        let bin_len = read_u32(bin_at)? as usize;
        if read_u32(bin_at + 4)? != CHUNK_BIN {
            return None;
        }
        Some(bytes.get(bin_at + 8..bin_at + 8 + bin_len)?.to_vec())
    } else {
        None
    };

    Some((json, bin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Aabb;
    use crate::pyramid::{Address, PixelRect};
    use tempfile::TempDir;

    fn sample_quad() -> Quad {
        Quad::for_tile(
            PixelRect {
                x: 0,
                y: 0,
                width: 16,
                height: 8,
            },
            8,
            0,
        )
    }

    #[test]
    fn tile_glb_is_well_formed() {
        let temp_dir = TempDir::new().unwrap();
        let writer = GlbWriter::new(temp_dir.path());

        let mut asset = writer.begin_asset(Address::from("012")).with_name("0_1_2");
        asset.add_quad(sample_quad(), PixelBuffer::filled(4, 4, [10, 20, 30, 255]));
        let asset_ref = writer.commit_asset(asset).unwrap();
        assert_eq!(asset_ref.uri, "_012.glb");

        let bytes = fs::read(temp_dir.path().join("_012.glb")).unwrap();
        assert_eq!(bytes.len() % 4, 0);
        let (doc, bin) = parse_glb(&bytes).unwrap();
        let bin = bin.unwrap();

        assert_eq!(doc["nodes"][0]["name"], "0_1_2");
        assert_eq!(doc["materials"][0]["alphaMode"], "BLEND");
        assert_eq!(doc["accessors"][0]["max"][0].as_f64().unwrap(), 2.0);
        assert_eq!(doc["buffers"][0]["byteLength"].as_u64().unwrap() as usize, bin.len());

        // the embedded image is a PNG
        let image_view = doc["images"][0]["bufferView"].as_u64().unwrap() as usize;
        let offset = doc["bufferViews"][image_view]["byteOffset"].as_u64().unwrap() as usize;
        assert_eq!(&bin[offset + 1..offset + 4], b"PNG");
    }

    #[test]
    fn empty_asset_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = GlbWriter::new(temp_dir.path());
        let asset = writer.begin_asset(Address::from("0"));
        assert!(matches!(
            writer.commit_asset(asset),
            Err(SerializationError::EmptyAsset { .. })
        ));
    }

    #[test]
    fn group_glb_lists_children() {
        let temp_dir = TempDir::new().unwrap();
        let writer = GlbWriter::new(temp_dir.path());

        let mut group = writer.begin_group(Address::root());
        group.add_child(AssetRef {
            address: Address::from("0"),
            kind: AssetKind::Group,
            uri: "0.glb".to_string(),
            bounds: Aabb {
                min: [0.0; 3],
                max: [1.0, 1.0, 0.0],
            },
        });
        let group_ref = writer.commit_group(group).unwrap();
        assert_eq!(group_ref.uri, "asset.glb");

        let bytes = fs::read(temp_dir.path().join("asset.glb")).unwrap();
        let (doc, bin) = parse_glb(&bytes).unwrap();
        assert!(bin.is_none());
        assert_eq!(doc["nodes"][0]["extras"]["uri"], "0.glb");
        assert_eq!(doc["nodes"][0]["extras"]["role"], "group");
        assert_eq!(doc["asset"]["extras"]["prefix"], "");
    }

    #[test]
    fn writing_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let writer = GlbWriter::new(temp_dir.path().join("missing"));
        let mut asset = writer.begin_asset(Address::from("0"));
        asset.add_quad(sample_quad(), PixelBuffer::filled(2, 2, [0, 0, 0, 255]));
        assert!(matches!(
            writer.commit_asset(asset),
            Err(SerializationError::Write { .. })
        ));
    }
}
