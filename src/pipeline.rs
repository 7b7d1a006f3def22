//! Sequencing: ladder, per-LOD tiling, grouping, manifest

use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};

use log::{info, warn};
use rayon::prelude::*;

use crate::asset::{AssetRef, AssetSink, GlbWriter, document_bounds};
use crate::config::TilerConfig;
use crate::error::{Result, TilerError};
use crate::manifest::{
    PREVIEW_DIR, PageSummary, manifest_records, write_descriptor, write_manifest, write_preview,
};
use crate::pyramid::{
    Address, DensityLadder, GroupTree, PageState, RasterContext, aggregate, emit_raster,
    inherit_content, page_prefix,
};
use crate::raster::Rasterizer;

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub levels: usize,
    pub densities: Vec<f64>,
    pub pages: usize,
    pub tiles: usize,
    pub groups: usize,
    pub root: AssetRef,
    pub elapsed: Duration,
}

/// Output of one page at one depth
struct PageLevel {
    page: usize,
    raster_size: (u32, u32),
    assets: Vec<AssetRef>,
    preview: Option<(String, (u32, u32))>,
}

/// Run the whole pipeline, writing `.glb` assets into `config.output`.
pub fn run_pipeline(config: &TilerConfig, rasterizer: &dyn Rasterizer) -> Result<PipelineReport> {
    let sink = GlbWriter::new(&config.output);
    run_pipeline_with_sink(config, rasterizer, &sink)
}

/// Run the pipeline with a custom asset sink. Manifest, descriptor and
/// previews still go to `config.output`.
pub fn run_pipeline_with_sink(
    config: &TilerConfig,
    rasterizer: &dyn Rasterizer,
    sink: &dyn AssetSink,
) -> Result<PipelineReport> {
    match config.jobs {
        Some(jobs) => rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| TilerError::configuration(format!("worker pool: {e}")))?
            .install(|| run(config, rasterizer, sink)),
        None => run(config, rasterizer, sink),
    }
}

fn run(
    config: &TilerConfig,
    rasterizer: &dyn Rasterizer,
    sink: &dyn AssetSink,
) -> Result<PipelineReport> {
    let started = Instant::now();

    // Nothing touches the output directory until the ladder is known to converge.
    let ladder = DensityLadder::build(
        rasterizer,
        config.density,
        config.density_floor,
        config.tile_size,
    )?;
    prepare_output(config)?;

    let page_count = ladder.page_count();
    let levels = ladder.levels();
    let mut finest: Vec<AssetRef> = Vec::new();
    let mut coarse: HashMap<Address, AssetRef> = HashMap::new();
    let mut aspects = vec![1.0f32; page_count];
    let mut previews: Vec<Option<(String, (u32, u32))>> = vec![None; page_count];
    // each page's single tile at the depth it finalizes
    let mut final_tiles: Vec<Option<AssetRef>> = vec![None; page_count];

    for depth in 0..levels {
        let density = ladder.density(depth);
        let pages: Vec<usize> = (0..page_count)
            .filter(|&page| match ladder.state_at(page, depth) {
                PageState::Pending => true,
                PageState::Finalized(final_depth) => final_depth == depth,
            })
            .collect();
        info!(
            "LOD {depth}: density {density}, {} of {page_count} pages",
            pages.len()
        );

        let outputs: Vec<PageLevel> = pages
            .par_iter()
            .map(|&page| process_page(config, rasterizer, sink, &ladder, page, depth))
            .collect::<Result<_>>()?;

        for output in outputs {
            if depth == 0 {
                let (w, h) = output.raster_size;
                aspects[output.page] = w as f32 / h.max(1) as f32;
            }
            if let Some(preview) = output.preview {
                previews[output.page] = Some(preview);
            }
            if ladder.state_at(output.page, depth) == PageState::Finalized(depth) {
                final_tiles[output.page] = output.assets.first().cloned();
            }
            if depth == 0 {
                finest.extend(output.assets);
            } else {
                for asset in output.assets {
                    if let Some(existing) = coarse.insert(asset.address.clone(), asset) {
                        return Err(TilerError::AddressCollision {
                            address: existing.address.to_string(),
                            detail: format!("two tiles at depth {depth}"),
                        });
                    }
                }
            }
        }
    }

    let tiles = finest.len() + coarse.len();
    info!("Emitted {tiles} tiles over {levels} levels");

    let mut content = coarse.clone();
    for (page, tile) in final_tiles.iter().enumerate() {
        if let Some(tile) = tile {
            inherit_content(&mut content, tile, page_prefix(page, page_count).len());
        }
    }

    let tree: GroupTree = aggregate(sink, finest, &content)?;
    let unreferenced = coarse
        .keys()
        .filter(|address| !tree.members.contains_key(*address))
        .count();
    if unreferenced > 0 {
        warn!("{unreferenced} coarse tiles have no finer descendants and are not referenced by any group");
    }

    let summaries = previews
        .into_iter()
        .enumerate()
        .map(|(page, preview)| {
            let (preview_path, preview_size) = preview.ok_or_else(|| {
                TilerError::configuration(format!("page {page} produced no preview"))
            })?;
            Ok(PageSummary {
                page,
                preview_path,
                preview_size,
                prefix: page_prefix(page, page_count),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let records = manifest_records(&config.document_name(), &summaries, &config.coordinate_system);
    write_manifest(&config.output, &records)?;
    write_descriptor(&config.output, levels, &document_bounds(&aspects))?;

    let report = PipelineReport {
        levels,
        densities: ladder.densities().to_vec(),
        pages: page_count,
        tiles,
        groups: tree.group_count(),
        root: tree.root,
        elapsed: started.elapsed(),
    };
    info!(
        "Wrote {} tiles and {} groups for {} pages",
        report.tiles, report.groups, report.pages
    );
    Ok(report)
}

fn prepare_output(config: &TilerConfig) -> Result<()> {
    let preview_dir = config.output.join(PREVIEW_DIR);
    fs::create_dir_all(&preview_dir).map_err(|e| TilerError::io(&preview_dir, e))
}

fn process_page(
    config: &TilerConfig,
    rasterizer: &dyn Rasterizer,
    sink: &dyn AssetSink,
    ladder: &DensityLadder,
    page: usize,
    depth: usize,
) -> Result<PageLevel> {
    let density = ladder.density(depth);
    let raster = rasterizer
        .rasterize(page, density)
        .map_err(|source| TilerError::Rasterization {
            page,
            density,
            source,
        })?;

    let ctx = RasterContext {
        page,
        page_count: ladder.page_count(),
        levels: ladder.levels(),
        depth,
        density,
        tile_size: config.tile_size,
    };
    let assets = emit_raster(sink, &raster, &ctx)?;

    let preview = if depth == ladder.preview_depth(page, config.preview_level_offset) {
        let path = write_preview(&config.output, page, &raster, config.preview_quality)?;
        Some((path, raster.dimensions()))
    } else {
        None
    };

    Ok(PageLevel {
        page,
        raster_size: raster.dimensions(),
        assets,
        preview,
    })
}
