use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use pdf_pyramid::panic_handler::initialize_panic_handler;
use pdf_pyramid::raster::MupdfRasterizer;
use pdf_pyramid::{Args, TilerConfig, run_pipeline};

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
    }

    CombinedLogger::init(loggers).context("Failed to initialize logging")?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = TilerConfig::from_args(args).context("Invalid configuration")?;
    info!(
        "Converting {} into {} (tile size {}, density {})",
        config.input.display(),
        config.output.display(),
        config.tile_size,
        config.density
    );

    let rasterizer = MupdfRasterizer::open(&config.input)
        .with_context(|| format!("Failed to open {}", config.input.display()))?;
    let report = run_pipeline(&config, &rasterizer).context("Pipeline failed")?;

    info!(
        "{} pages, {} levels, {} tiles, {} groups",
        report.pages, report.levels, report.tiles, report.groups
    );
    info!("Write complete in {:.2?}", report.elapsed);
    Ok(())
}

fn main() -> Result<()> {
    initialize_panic_handler();
    let args = Args::parse();
    init_logging(&args)?;

    // logged once, on stderr and in --log-file
    if let Err(err) = run(&args) {
        error!("{err:?}");
        log::logger().flush();
        std::process::exit(1);
    }
    Ok(())
}
