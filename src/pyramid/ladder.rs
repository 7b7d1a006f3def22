//! Density ladder: how many LOD levels a document needs

use log::{debug, info};

use crate::error::{Result, TilerError};
use crate::raster::Rasterizer;

/// Per-page progress through the ladder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    /// Still larger than one tile at the densities seen so far
    Pending,
    /// Fits in one tile at this depth; never rasterized at coarser depths
    Finalized(usize),
}

/// The ordered densities of a document, finest (depth 0) first.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityLadder {
    densities: Vec<f64>,
    /// Depth at which each page first fits in a single tile
    final_depths: Vec<usize>,
}

impl DensityLadder {
    /// Halve `initial_density` until every page's longest side is `<= tile_size`.
    ///
    /// A density at or below `density_floor` before convergence is a
    /// configuration error.
    pub fn build(
        rasterizer: &dyn Rasterizer,
        initial_density: f64,
        density_floor: f64,
        tile_size: u32,
    ) -> Result<Self> {
        let page_count = rasterizer.page_count();
        if page_count == 0 {
            return Err(TilerError::configuration("document has no pages"));
        }
        if tile_size == 0 {
            return Err(TilerError::configuration("tile size must be positive"));
        }

        let mut states = vec![PageState::Pending; page_count];
        let mut densities = Vec::new();
        let mut density = initial_density;

        loop {
            if !density.is_finite() || density <= density_floor {
                return Err(TilerError::configuration(format!(
                    "density {density} reached the floor {density_floor} before every page fit in a {tile_size}px tile"
                )));
            }

            let depth = densities.len();
            densities.push(density);

            for (page, state) in states.iter_mut().enumerate() {
                if *state != PageState::Pending {
                    continue;
                }
                let (width, height) =
                    rasterizer
                        .measure(page, density)
                        .map_err(|source| TilerError::Rasterization {
                            page,
                            density,
                            source,
                        })?;
                if width.max(height) <= tile_size {
                    debug!("Page {page} fits one tile at depth {depth} ({width}x{height})");
                    *state = PageState::Finalized(depth);
                }
            }

            if states.iter().all(|s| matches!(s, PageState::Finalized(_))) {
                break;
            }
            density /= 2.0;
        }

        let final_depths = states
            .into_iter()
            .map(|s| match s {
                PageState::Finalized(depth) => depth,
                PageState::Pending => unreachable!("loop exits only when all pages are finalized"),
            })
            .collect();

        info!(
            "Density ladder: {} levels ({:?})",
            densities.len(),
            densities
        );

        Ok(Self {
            densities,
            final_depths,
        })
    }

    /// Number of LOD levels
    #[must_use]
    pub fn levels(&self) -> usize {
        self.densities.len()
    }

    #[must_use]
    pub fn densities(&self) -> &[f64] {
        &self.densities
    }

    #[must_use]
    pub fn density(&self, depth: usize) -> f64 {
        self.densities[depth]
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.final_depths.len()
    }

    /// Coarsest depth a page is rasterized at
    fn final_depth(&self, page: usize) -> usize {
        self.final_depths[page]
    }

    /// State of `page` when processing `depth`: pages past their final depth are skipped.
    #[must_use]
    pub fn state_at(&self, page: usize, depth: usize) -> PageState {
        let final_depth = self.final_depth(page);
        if depth >= final_depth {
            PageState::Finalized(final_depth)
        } else {
            PageState::Pending
        }
    }

    /// Depth used for a page's preview image: `offset` levels back from the
    /// coarse end of the ladder, never coarser than where the page finalized.
    #[must_use]
    pub fn preview_depth(&self, page: usize, offset: usize) -> usize {
        self.levels()
            .saturating_sub(offset)
            .min(self.final_depth(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticRasterizer;

    #[test]
    fn wide_strip_needs_two_halvings() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(1000, 1)]);
        let ladder = DensityLadder::build(&raster, 500.0, 10.0, 256).unwrap();
        assert_eq!(ladder.densities(), &[500.0, 250.0, 125.0]);
        assert_eq!(ladder.final_depth(0), 2);
    }

    #[test]
    fn exact_tile_page_has_single_level() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(256, 256)]);
        let ladder = DensityLadder::build(&raster, 500.0, 10.0, 256).unwrap();
        assert_eq!(ladder.levels(), 1);
        assert_eq!(ladder.state_at(0, 0), PageState::Finalized(0));
    }

    #[test]
    fn small_pages_finalize_early() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(2000, 1000), (200, 100)]);
        let ladder = DensityLadder::build(&raster, 500.0, 10.0, 256).unwrap();
        assert_eq!(ladder.levels(), 4);
        assert_eq!(ladder.final_depth(1), 0);
        assert_eq!(ladder.state_at(1, 0), PageState::Finalized(0));
        assert_eq!(ladder.state_at(0, 1), PageState::Pending);
        assert_eq!(ladder.state_at(1, 2), PageState::Finalized(0));
        assert_eq!(ladder.state_at(0, 2), PageState::Pending);
    }

    #[test]
    fn floor_without_convergence_is_configuration_error() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(100_000, 100_000)]);
        let err = DensityLadder::build(&raster, 500.0, 100.0, 256).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn initial_density_below_floor_fails() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(10, 10)]);
        let err = DensityLadder::build(&raster, 5.0, 10.0, 256).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn ladder_length_is_bounded_by_density_range() {
        for &(w, h) in &[(1, 1), (300, 7000), (12_345, 678), (40_000, 40_000)] {
            let raster = SyntheticRasterizer::from_pixels(500.0, &[(w, h)]);
            let ladder = DensityLadder::build(&raster, 500.0, 1.0, 256).unwrap();
            let bound = (500.0f64 / 1.0).log2().floor() as usize + 1;
            assert!(ladder.levels() <= bound, "{w}x{h}: {} levels", ladder.levels());
        }
    }

    #[test]
    fn preview_depth_stays_within_page_levels() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[(40_000, 30_000), (300, 300)]);
        let ladder = DensityLadder::build(&raster, 500.0, 1.0, 256).unwrap();
        assert_eq!(ladder.levels(), 9);
        assert_eq!(ladder.preview_depth(0, 5), 4);
        assert_eq!(ladder.preview_depth(1, 5), 1);
        assert_eq!(ladder.preview_depth(0, 20), 0);
    }

    #[test]
    fn empty_document_is_rejected() {
        let raster = SyntheticRasterizer::from_pixels(500.0, &[]);
        assert!(DensityLadder::build(&raster, 500.0, 10.0, 256).unwrap_err().is_configuration());
    }
}
