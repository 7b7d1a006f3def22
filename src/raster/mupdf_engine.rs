//! MuPDF-backed rasterizer

use std::path::{Path, PathBuf};

use log::debug;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::{CHANNELS, PixelBuffer, Rasterizer, pixel_extent};
use crate::error::RasterizationError;

/// Resolution MuPDF renders at with an identity transform
const BASE_DPI: f64 = 72.0;

/// Rasterizes PDF pages with MuPDF.
///
/// Page boxes are read once on open so `measure` never touches the engine.
/// MuPDF documents are not thread-safe, so every `rasterize` call opens its
/// own handle.
#[derive(Debug)]
pub struct MupdfRasterizer {
    path: PathBuf,
    /// Page sizes in points (width, height)
    page_sizes: Vec<(f64, f64)>,
}

impl MupdfRasterizer {
    pub fn open(path: &Path) -> Result<Self, RasterizationError> {
        let doc = Self::open_document(path)?;
        let page_count = doc.page_count()? as usize;
        let mut page_sizes = Vec::with_capacity(page_count);

        for page_num in 0..page_count {
            let page = doc.load_page(page_num as i32)?;
            let bounds = page.bounds()?;
            let width = f64::from((bounds.x1 - bounds.x0).abs());
            let height = f64::from((bounds.y1 - bounds.y0).abs());
            debug!("Page {page_num}: {width:.1}x{height:.1} pt");
            page_sizes.push((width, height));
        }

        Ok(Self {
            path: path.to_path_buf(),
            page_sizes,
        })
    }

    fn open_document(path: &Path) -> Result<Document, RasterizationError> {
        Ok(Document::open(path.to_string_lossy().as_ref())?)
    }

    fn page_size(&self, page: usize) -> Result<(f64, f64), RasterizationError> {
        self.page_sizes
            .get(page)
            .copied()
            .ok_or(RasterizationError::PageOutOfRange {
                page,
                page_count: self.page_sizes.len(),
            })
    }
}

impl Rasterizer for MupdfRasterizer {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn measure(&self, page: usize, density: f64) -> Result<(u32, u32), RasterizationError> {
        let (width, height) = self.page_size(page)?;
        Ok((pixel_extent(width, density), pixel_extent(height, density)))
    }

    fn rasterize(&self, page: usize, density: f64) -> Result<PixelBuffer, RasterizationError> {
        self.page_size(page)?;
        let doc = Self::open_document(&self.path)?;
        let page = doc.load_page(page as i32)?;

        let mag = (density / BASE_DPI) as f32;
        let transform = Matrix::new_scale(mag, mag);
        let rgb = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&transform, &rgb, true, false)?;

        let pixels = pixmap_to_rgba(&pixmap)?;
        PixelBuffer::from_rgba(pixmap.width(), pixmap.height(), pixels)
    }
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<Vec<u8>, RasterizationError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RasterizationError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(RasterizationError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * CHANNELS);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == CHANNELS {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
                out.push(u8::MAX);
            }
        }
    }

    Ok(out)
}
