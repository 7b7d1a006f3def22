//! Quad geometry in normalized page space
//!
//! A page occupies `[0, aspect] × [0, 1]` with y pointing up; page `p` sits
//! at `z = -p * PAGE_DEPTH_STEP`.

use serde::Serialize;

use crate::pyramid::PixelRect;

/// Depth offset between consecutive pages
pub const PAGE_DEPTH_STEP: f32 = 0.001;

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// The identity for `union`
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|k| self.min[k] > self.max[k])
    }

    #[must_use]
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        points.iter().fold(Self::empty(), |acc, p| acc.include(*p))
    }

    #[must_use]
    pub fn include(mut self, p: [f32; 3]) -> Self {
        for k in 0..3 {
            self.min[k] = self.min[k].min(p[k]);
            self.max[k] = self.max[k].max(p[k]);
        }
        self
    }

    #[must_use]
    pub fn union(&self, other: &Aabb) -> Aabb {
        if other.is_empty() {
            return *self;
        }
        self.include(other.min).include(other.max)
    }

    #[must_use]
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Radius of the bounding sphere centered on `center()`
    #[must_use]
    pub fn radius(&self) -> f32 {
        let d = [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ];
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() * 0.5
    }
}

/// Planar quad: corners counter-clockwise from bottom-left
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub positions: [[f32; 3]; 4],
    pub uvs: [[f32; 2]; 4],
}

impl Quad {
    /// Two triangles over the corners
    pub const INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

    /// Quad covering `rect` of a raster `raster_height` pixels tall.
    ///
    /// Pixels are scaled by `1 / raster_height` so the page is one unit tall and
    /// `aspect` wide; image rows run downward so y is flipped.
    #[must_use]
    pub fn for_tile(rect: PixelRect, raster_height: u32, page: usize) -> Self {
        let scale = 1.0 / raster_height.max(1) as f64;
        let x0 = (f64::from(rect.x) * scale) as f32;
        let x1 = (f64::from(rect.right()) * scale) as f32;
        let y_top = (1.0 - f64::from(rect.y) * scale) as f32;
        let y_bottom = (1.0 - f64::from(rect.bottom()) * scale) as f32;
        let z = page_depth(page);

        Self {
            positions: [
                [x0, y_bottom, z],
                [x1, y_bottom, z],
                [x1, y_top, z],
                [x0, y_top, z],
            ],
            uvs: [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
        }
    }

    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        let b = self.bounds();
        (b.max[0] - b.min[0]) * (b.max[1] - b.min[1])
    }
}

/// Depth of page `page`; strictly decreasing with the page index
#[must_use]
pub fn page_depth(page: usize) -> f32 {
    -(page as f32) * PAGE_DEPTH_STEP
}

/// Union of the page rectangles, given each page's aspect ratio (width / height)
#[must_use]
pub fn document_bounds(aspects: &[f32]) -> Aabb {
    aspects
        .iter()
        .enumerate()
        .fold(Aabb::empty(), |acc, (page, &aspect)| {
            let z = page_depth(page);
            acc.include([0.0, 0.0, z]).include([aspect, 1.0, z])
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::TileGrid;

    #[test]
    fn tile_quads_cover_page_exactly() {
        let (w, h) = (700u32, 1500u32);
        let grid = TileGrid::new(w, h, 256);
        let area: f64 = grid
            .tiles()
            .map(|t| f64::from(Quad::for_tile(t.rect, h, 0).area()))
            .sum();
        let aspect = f64::from(w) / f64::from(h);
        assert!((area - aspect).abs() < 1e-4, "area {area} vs {aspect}");
    }

    #[test]
    fn first_tile_touches_top_left() {
        let grid = TileGrid::new(512, 512, 256);
        let quad = Quad::for_tile(grid.rect(0, 0).unwrap(), 512, 0);
        assert_eq!(quad.positions[3], [0.0, 1.0, 0.0]);
        assert_eq!(quad.positions[1], [0.5, 0.5, 0.0]);
        // top-left corner samples the first texture row
        assert_eq!(quad.uvs[3], [0.0, 0.0]);
    }

    #[test]
    fn pages_stack_backwards() {
        assert!(page_depth(1) < page_depth(0));
        assert!(page_depth(2) < page_depth(1));
        let rect = PixelRect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        assert_eq!(Quad::for_tile(rect, 10, 3).positions[0][2], page_depth(3));
    }

    #[test]
    fn document_bounds_union_pages() {
        let bounds = document_bounds(&[0.5, 2.0, 1.0]);
        assert_eq!(bounds.min, [0.0, 0.0, page_depth(2)]);
        assert_eq!(bounds.max, [2.0, 1.0, 0.0]);
        assert!(bounds.radius() > 1.0);
        assert!(Aabb::empty().is_empty());
    }
}
