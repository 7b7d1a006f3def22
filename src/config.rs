//! Command line arguments, optional YAML settings and the validated run configuration

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::debug;
use serde::Deserialize;

use crate::error::{Result, TilerError};

pub const DEFAULT_TILE_SIZE: u32 = 256;
pub const DEFAULT_DENSITY: f64 = 500.0;
/// The ladder gives up once density drops to this many dots per inch
pub const DEFAULT_DENSITY_FLOOR: f64 = 10.0;
pub const DEFAULT_COORDINATE_SYSTEM: &str = "EPSG:4326";
/// Previews are taken this many levels back from the coarse end of the ladder
pub const DEFAULT_PREVIEW_LEVEL_OFFSET: usize = 5;
pub const DEFAULT_PREVIEW_QUALITY: u8 = 85;
const MAX_TILE_SIZE: u32 = 16_384;

/// Convert a PDF document into a quadtree tile pyramid of glTF assets
#[derive(Parser, Debug, Clone)]
#[command(name = "pdf-pyramid", version, about)]
pub struct Args {
    /// Input PDF file
    #[arg(short = 'i', long = "input", value_name = "Document.pdf")]
    pub input: PathBuf,

    /// Output directory (created if missing)
    #[arg(short = 'o', long = "output", value_name = "outdir")]
    pub output: PathBuf,

    /// Tile edge length in pixels [default: 256]
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Initial rasterization density in dpi [default: 500]
    #[arg(long)]
    pub density: Option<f64>,

    /// Lowest density the ladder may reach [default: 10]
    #[arg(long)]
    pub density_floor: Option<f64>,

    /// Coordinate system tag recorded in the manifest [default: EPSG:4326]
    #[arg(short = 'e', long = "epsg")]
    pub coordinate_system: Option<String>,

    /// How many levels back from the coarsest the page previews are taken [default: 5]
    #[arg(long)]
    pub preview_offset: Option<usize>,

    /// JPEG quality of page previews, 1-100 [default: 85]
    #[arg(long)]
    pub preview_quality: Option<u8>,

    /// Worker threads (defaults to one per core)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// YAML settings file providing defaults for the options above
    #[arg(short = 'c', long = "config")]
    pub settings: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Tunables loadable from a settings file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub tile_size: Option<u32>,
    pub density: Option<f64>,
    pub density_floor: Option<f64>,
    pub coordinate_system: Option<String>,
    pub preview_level_offset: Option<usize>,
    pub preview_quality: Option<u8>,
    pub jobs: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TilerError::configuration(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::parse(&text).map_err(|e| {
            TilerError::configuration(format!("invalid settings {}: {e}", path.display()))
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Everything a pipeline run needs, validated
#[derive(Debug, Clone, PartialEq)]
pub struct TilerConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tile_size: u32,
    pub density: f64,
    pub density_floor: f64,
    pub coordinate_system: String,
    pub preview_level_offset: usize,
    pub preview_quality: u8,
    pub jobs: Option<usize>,
}

impl TilerConfig {
    /// Defaults for everything but the paths. Not validated.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            tile_size: DEFAULT_TILE_SIZE,
            density: DEFAULT_DENSITY,
            density_floor: DEFAULT_DENSITY_FLOOR,
            coordinate_system: DEFAULT_COORDINATE_SYSTEM.to_string(),
            preview_level_offset: DEFAULT_PREVIEW_LEVEL_OFFSET,
            preview_quality: DEFAULT_PREVIEW_QUALITY,
            jobs: None,
        }
    }

    /// Defaults, then the settings file, then command line flags
    pub fn from_args(args: &Args) -> Result<Self> {
        let settings = match &args.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let config = Self::resolve(args, &settings);
        config.validate()?;
        debug!("Resolved configuration: {config:?}");
        Ok(config)
    }

    fn resolve(args: &Args, settings: &Settings) -> Self {
        let mut config = Self::new(&args.input, &args.output);
        config.tile_size = args.tile_size.or(settings.tile_size).unwrap_or(config.tile_size);
        config.density = args.density.or(settings.density).unwrap_or(config.density);
        config.density_floor = args
            .density_floor
            .or(settings.density_floor)
            .unwrap_or(config.density_floor);
        if let Some(crs) = args
            .coordinate_system
            .clone()
            .or_else(|| settings.coordinate_system.clone())
        {
            config.coordinate_system = crs;
        }
        config.preview_level_offset = args
            .preview_offset
            .or(settings.preview_level_offset)
            .unwrap_or(config.preview_level_offset);
        config.preview_quality = args
            .preview_quality
            .or(settings.preview_quality)
            .unwrap_or(config.preview_quality);
        config.jobs = args.jobs.or(settings.jobs);
        config
    }

    /// Checks that need no document. Touches nothing on disk.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(TilerError::configuration(format!(
                "tile size must be between 1 and {MAX_TILE_SIZE}, got {}",
                self.tile_size
            )));
        }
        if !self.density.is_finite() || self.density <= 0.0 {
            return Err(TilerError::configuration(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        if !self.density_floor.is_finite() || self.density_floor < 0.0 {
            return Err(TilerError::configuration(format!(
                "density floor must be non-negative, got {}",
                self.density_floor
            )));
        }
        if self.density <= self.density_floor {
            return Err(TilerError::configuration(format!(
                "density {} is not above the floor {}",
                self.density, self.density_floor
            )));
        }
        if !(1..=100).contains(&self.preview_quality) {
            return Err(TilerError::configuration(format!(
                "preview quality must be 1-100, got {}",
                self.preview_quality
            )));
        }
        if self.jobs == Some(0) {
            return Err(TilerError::configuration("jobs must be at least 1"));
        }
        if !self.input.is_file() {
            return Err(TilerError::configuration(format!(
                "input file {} does not exist",
                self.input.display()
            )));
        }
        self.validate_output()
    }

    /// The output directory, or its nearest existing ancestor, must be a
    /// writable directory.
    fn validate_output(&self) -> Result<()> {
        let Some(existing) = self
            .output
            .ancestors()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .find(|p| p.exists())
        else {
            return Err(TilerError::configuration(format!(
                "output {} has no existing parent directory",
                self.output.display()
            )));
        };

        if !existing.is_dir() {
            return Err(TilerError::configuration(format!(
                "output {}: {} exists and is not a directory",
                self.output.display(),
                existing.display()
            )));
        }
        let readonly = fs::metadata(existing)
            .map(|m| m.permissions().readonly())
            .map_err(|e| TilerError::io(existing, e))?;
        if readonly {
            return Err(TilerError::configuration(format!(
                "output {}: {} is not writable",
                self.output.display(),
                existing.display()
            )));
        }
        Ok(())
    }

    /// File stem of the input, used as the document name
    #[must_use]
    pub fn document_name(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["pdf-pyramid", "-i", "in.pdf", "-o", "out"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn cli_defaults() {
        let config = TilerConfig::resolve(&args(&[]), &Settings::default());
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.density, 500.0);
        assert_eq!(config.coordinate_system, "EPSG:4326");
        assert_eq!(config.preview_level_offset, 5);
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings::parse("tile_size: 512\ndensity: 300\njobs: 2\n").unwrap();
        let config = TilerConfig::resolve(&args(&["--tile-size", "128"]), &settings);
        assert_eq!(config.tile_size, 128);
        assert_eq!(config.density, 300.0);
        assert_eq!(config.jobs, Some(2));
    }

    #[test]
    fn unknown_settings_are_rejected() {
        assert!(Settings::parse("tile_sise: 512\n").is_err());
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn epsg_flag() {
        let config = TilerConfig::resolve(&args(&["-e", "EPSG:3857"]), &Settings::default());
        assert_eq!(config.coordinate_system, "EPSG:3857");
    }

    #[test]
    fn validation_errors() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("doc.pdf");
        fs::write(&input, b"%PDF-1.4").unwrap();
        let out = temp_dir.path().join("out");

        let ok = TilerConfig::new(&input, &out);
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.tile_size = 0;
        assert!(bad.validate().unwrap_err().is_configuration());

        let mut bad = ok.clone();
        bad.density = 5.0;
        assert!(bad.validate().unwrap_err().is_configuration());

        let mut bad = ok.clone();
        bad.input = temp_dir.path().join("missing.pdf");
        assert!(bad.validate().unwrap_err().is_configuration());

        let mut bad = ok.clone();
        bad.output = input.clone();
        assert!(bad.validate().unwrap_err().is_configuration());

        assert!(!out.exists());
    }

    #[test]
    fn output_under_read_only_directory_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("doc.pdf");
        fs::write(&input, b"%PDF-1.4").unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();

        let mut permissions = fs::metadata(&locked).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&locked, permissions.clone()).unwrap();

        let result = TilerConfig::new(&input, locked.join("nested").join("out")).validate();

        permissions.set_readonly(false);
        fs::set_permissions(&locked, permissions).unwrap();

        assert!(result.unwrap_err().is_configuration());
        assert!(!locked.join("nested").exists());
    }

    #[test]
    fn output_below_a_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("doc.pdf");
        fs::write(&input, b"%PDF-1.4").unwrap();

        let err = TilerConfig::new(&input, input.join("out")).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn document_name_is_file_stem() {
        assert_eq!(TilerConfig::new("a/b/Report.pdf", "out").document_name(), "Report");
    }
}
