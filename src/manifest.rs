//! Document manifest, asset descriptor and page previews

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use log::debug;
use serde::Serialize;

use crate::asset::Aabb;
use crate::error::SerializationError;
use crate::raster::PixelBuffer;

pub const MANIFEST_FILE: &str = "manifest.jsonl";
pub const DESCRIPTOR_FILE: &str = "asset.json";
pub const PREVIEW_DIR: &str = "preview";

const PARSER_NAME: &str = "pdf_reader";
const PARSER_VERSION: &str = "1.0";

/// Record type of the document root
pub const TYPE_ROOT: u32 = 0;
/// Record type of a page
pub const TYPE_PAGE: u32 = 1;

/// One line of `manifest.jsonl`
#[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
pub struct ManifestRecord {
    pub id: u32,
    pub path: String,
    pub level: u32,
    #[serde(rename = "type")]
    pub kind: u32,
    pub name: String,
    pub properties: Vec<(String, String)>,
}

/// What the manifest needs to know about one page
#[derive(Clone, Debug)]
pub struct PageSummary {
    pub page: usize,
    /// Preview path relative to the output directory
    pub preview_path: String,
    pub preview_size: (u32, u32),
    /// Address prefix of the page's subtree
    pub prefix: String,
}

#[derive(Serialize)]
struct BoxBounds {
    #[serde(rename = "Min")]
    min: [f32; 3],
    #[serde(rename = "Max")]
    max: [f32; 3],
}

#[derive(Serialize)]
struct SphereBounds {
    #[serde(rename = "Center")]
    center: [f32; 3],
    #[serde(rename = "Radius")]
    radius: f32,
}

#[derive(Serialize)]
struct Bounds {
    #[serde(rename = "box")]
    bbox: BoxBounds,
    sphere: SphereBounds,
}

/// `asset.json`
#[derive(Serialize)]
struct AssetDescriptor<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    levels: usize,
    bounds: Bounds,
    parsers: Vec<(&'a str, &'a str)>,
}

/// Build the manifest records: a root record when there are several pages,
/// then one record per page.
#[must_use]
pub fn manifest_records(
    document_name: &str,
    pages: &[PageSummary],
    coordinate_system: &str,
) -> Vec<ManifestRecord> {
    let crs = ("coordinate_system".to_string(), coordinate_system.to_string());
    let page_record = |id: u32, level: u32, page: &PageSummary| ManifestRecord {
        id,
        path: page.preview_path.clone(),
        level,
        kind: TYPE_PAGE,
        name: if pages.len() == 1 {
            document_name.to_string()
        } else {
            format!("Page {}", page.page + 1)
        },
        properties: vec![
            ("page".to_string(), page.page.to_string()),
            ("width".to_string(), page.preview_size.0.to_string()),
            ("height".to_string(), page.preview_size.1.to_string()),
            ("prefix".to_string(), page.prefix.clone()),
            crs.clone(),
        ],
    };

    if let [only] = pages {
        return vec![page_record(0, 0, only)];
    }

    let mut records = Vec::with_capacity(pages.len() + 1);
    records.push(ManifestRecord {
        id: 0,
        path: String::new(),
        level: 0,
        kind: TYPE_ROOT,
        name: document_name.to_string(),
        properties: vec![("pages".to_string(), pages.len().to_string()), crs.clone()],
    });
    for (k, page) in pages.iter().enumerate() {
        records.push(page_record(k as u32 + 1, 1, page));
    }
    records
}

/// Write records as newline-delimited JSON
pub fn write_manifest(dir: &Path, records: &[ManifestRecord]) -> Result<(), SerializationError> {
    let path = dir.join(MANIFEST_FILE);
    let write_err = |source| SerializationError::Write {
        path: path.clone(),
        source,
    };

    let file = File::create(&path).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n").map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;
    debug!("Wrote {} manifest records", records.len());
    Ok(())
}

/// Write `asset.json` for a document with `levels` LODs spanning `bounds`
pub fn write_descriptor(dir: &Path, levels: usize, bounds: &Aabb) -> Result<(), SerializationError> {
    let descriptor = AssetDescriptor {
        kind: "document",
        levels,
        bounds: Bounds {
            bbox: BoxBounds {
                min: bounds.min,
                max: bounds.max,
            },
            sphere: SphereBounds {
                center: bounds.center(),
                radius: bounds.radius(),
            },
        },
        parsers: vec![(PARSER_NAME, PARSER_VERSION)],
    };

    let path = dir.join(DESCRIPTOR_FILE);
    let bytes = serde_json::to_vec_pretty(&descriptor)?;
    fs::write(&path, bytes).map_err(|source| SerializationError::Write { path, source })
}

/// Preview path of `page`, relative to the output directory
#[must_use]
pub fn preview_path(page: usize) -> String {
    format!("{PREVIEW_DIR}/{page:04}.jpg")
}

/// Encode `raster` as the JPEG preview of `page`. Returns the relative path.
pub fn write_preview(
    dir: &Path,
    page: usize,
    raster: &PixelBuffer,
    quality: u8,
) -> Result<String, SerializationError> {
    let relative = preview_path(page);
    let path = dir.join(&relative);

    let (width, height) = raster.dimensions();
    let rgba = RgbaImage::from_raw(width, height, raster.as_bytes().to_vec()).ok_or_else(|| {
        image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        ))
    })?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let file = File::create(&path).map_err(|source| SerializationError::Write {
        path: path.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    out.flush()
        .map_err(|source| SerializationError::Write { path, source })?;
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary(page: usize) -> PageSummary {
        PageSummary {
            page,
            preview_path: preview_path(page),
            preview_size: (200, 100),
            prefix: page.to_string(),
        }
    }

    #[test]
    fn single_page_manifest_has_one_root_level_page() {
        let records = manifest_records("doc", &[summary(0)], "EPSG:4326");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, 0);
        assert_eq!(records[0].kind, TYPE_PAGE);
        assert_eq!(records[0].path, "preview/0000.jpg");
    }

    #[test]
    fn multi_page_manifest_has_root_then_pages() {
        let records = manifest_records("doc", &[summary(0), summary(1), summary(2)], "EPSG:4326");
        assert_eq!(records.len(), 4);
        assert_eq!((records[0].level, records[0].kind), (0, TYPE_ROOT));
        for (k, record) in records[1..].iter().enumerate() {
            assert_eq!(record.id, k as u32 + 1);
            assert_eq!((record.level, record.kind), (1, TYPE_PAGE));
        }
    }

    #[test]
    fn manifest_is_newline_delimited_json() {
        let temp_dir = TempDir::new().unwrap();
        let records = manifest_records("doc", &[summary(0), summary(1)], "EPSG:3857");
        write_manifest(temp_dir.path(), &records).unwrap();

        let text = fs::read_to_string(temp_dir.path().join(MANIFEST_FILE)).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["properties"][0][0], "page");
    }

    #[test]
    fn descriptor_layout() {
        let temp_dir = TempDir::new().unwrap();
        let bounds = Aabb {
            min: [0.0, 0.0, -0.002],
            max: [0.75, 1.0, 0.0],
        };
        write_descriptor(temp_dir.path(), 3, &bounds).unwrap();

        let text = fs::read_to_string(temp_dir.path().join(DESCRIPTOR_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "document");
        assert_eq!(value["levels"], 3);
        assert_eq!(value["bounds"]["box"]["Max"][0].as_f64().unwrap(), 0.75);
        assert!(value["bounds"]["sphere"]["Radius"].as_f64().unwrap() > 0.5);
        assert_eq!(value["parsers"][0][0], "pdf_reader");
        assert_eq!(value["parsers"][0][1], "1.0");
    }

    #[test]
    fn preview_is_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(PREVIEW_DIR)).unwrap();
        let raster = PixelBuffer::filled(40, 20, [255, 0, 0, 255]);
        let path = write_preview(temp_dir.path(), 7, &raster, 80).unwrap();
        assert_eq!(path, "preview/0007.jpg");

        let bytes = fs::read(temp_dir.path().join(&path)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
