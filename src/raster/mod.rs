//! Rasterization boundary: pixel buffers, the rasterizer trait and resampling

#[cfg(feature = "pdf")]
mod mupdf_engine;

use std::num::NonZeroU32;

use fast_image_resize as fr;

use crate::error::RasterizationError;

#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfRasterizer;

/// Bytes per RGBA8 pixel
pub const CHANNELS: usize = 4;

/// Owned RGBA8 raster, rows top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    /// Wrap raw RGBA8 pixels. Fails if the buffer length does not match.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RasterizationError> {
        let expected = width as usize * height as usize * CHANNELS;
        if width == 0 || height == 0 {
            return Err(RasterizationError::generic(format!(
                "empty raster {width}x{height}"
            )));
        }
        if pixels.len() != expected {
            return Err(RasterizationError::generic(format!(
                "pixel buffer size mismatch: expected {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// A raster filled with one color
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy a sub-rectangle into a new buffer. The rectangle is clamped to the raster.
    #[must_use]
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);
        if width == 0 || height == 0 {
            return None;
        }

        let stride = self.width as usize * CHANNELS;
        let row_bytes = width as usize * CHANNELS;
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in y as usize..(y + height) as usize {
            let row_start = row * stride + x as usize * CHANNELS;
            data.extend_from_slice(&self.pixels[row_start..row_start + row_bytes]);
        }

        Some(Self {
            pixels: data,
            width,
            height,
        })
    }
}

/// The rasterization engine consumed by the pipeline.
///
/// Implementations must be shareable across rayon workers; the MuPDF adapter
/// opens a document handle per call for that reason.
pub trait Rasterizer: Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Pixel size of `page` at `density` without rendering it
    fn measure(&self, page: usize, density: f64) -> Result<(u32, u32), RasterizationError>;

    /// Render `page` at `density` (dots per inch) into an RGBA8 buffer
    fn rasterize(&self, page: usize, density: f64) -> Result<PixelBuffer, RasterizationError>;
}

/// Resample a buffer to exactly `target_width × target_height` using fast_image_resize.
pub fn resample(
    src: &PixelBuffer,
    target_width: u32,
    target_height: u32,
) -> Result<PixelBuffer, RasterizationError> {
    if src.dimensions() == (target_width, target_height) {
        return Ok(src.clone());
    }

    let src_image = fr::Image::from_vec_u8(
        NonZeroU32::new(src.width).ok_or_else(|| RasterizationError::Resize("zero source width".into()))?,
        NonZeroU32::new(src.height)
            .ok_or_else(|| RasterizationError::Resize("zero source height".into()))?,
        src.pixels.clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| RasterizationError::Resize(e.to_string()))?;

    let dst_width = NonZeroU32::new(target_width)
        .ok_or_else(|| RasterizationError::Resize("zero target width".into()))?;
    let dst_height = NonZeroU32::new(target_height)
        .ok_or_else(|| RasterizationError::Resize("zero target height".into()))?;
    let mut dst_image = fr::Image::new(dst_width, dst_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| RasterizationError::Resize(e.to_string()))?;

    PixelBuffer::from_rgba(target_width, target_height, dst_image.into_vec())
}

/// Pixel size of a page of `points` size (1/72 inch) rendered at `density` dpi.
///
/// Rounds up the way MuPDF rounds a transformed page box to whole pixels.
#[must_use]
pub fn pixel_extent(points: f64, density: f64) -> u32 {
    let px = (points * density / 72.0).ceil();
    if px < 1.0 { 1 } else { px as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clamps_to_raster() {
        let buf = PixelBuffer::filled(10, 6, [1, 2, 3, 255]);
        let tile = buf.crop(8, 4, 4, 4).unwrap();
        assert_eq!(tile.dimensions(), (2, 2));
        assert_eq!(tile.as_bytes().len(), 2 * 2 * CHANNELS);
    }

    #[test]
    fn crop_outside_is_none() {
        let buf = PixelBuffer::filled(10, 6, [0, 0, 0, 255]);
        assert!(buf.crop(10, 0, 4, 4).is_none());
        assert!(buf.crop(0, 6, 4, 4).is_none());
    }

    #[test]
    fn crop_copies_the_right_rows() {
        let mut pixels = Vec::new();
        for y in 0..4u8 {
            for x in 0..4u8 {
                pixels.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let buf = PixelBuffer::from_rgba(4, 4, pixels).unwrap();
        let tile = buf.crop(2, 1, 2, 2).unwrap();
        assert_eq!(&tile.as_bytes()[..4], &[2, 1, 0, 255]);
        assert_eq!(&tile.as_bytes()[12..], &[3, 2, 0, 255]);
    }

    #[test]
    fn from_rgba_rejects_wrong_length() {
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::from_rgba(0, 2, vec![]).is_err());
    }

    #[test]
    fn resample_to_full_tile() {
        let buf = PixelBuffer::filled(100, 37, [200, 10, 10, 255]);
        let out = resample(&buf, 256, 256).unwrap();
        assert_eq!(out.dimensions(), (256, 256));
        assert_eq!(out.as_bytes().len(), 256 * 256 * CHANNELS);
    }

    #[test]
    fn pixel_extent_rounds_up() {
        // US letter width at 72 dpi and 144 dpi
        assert_eq!(pixel_extent(612.0, 72.0), 612);
        assert_eq!(pixel_extent(612.0, 144.0), 1224);
        assert_eq!(pixel_extent(0.1, 72.0), 1);
    }
}
