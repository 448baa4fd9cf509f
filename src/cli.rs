use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, Overrides};
use crate::error::Result;
use crate::geometry::LatLon;
use crate::render::Frame;

#[derive(Parser, Debug)]
#[command(name = "landslide-overlay")]
#[command(
    version,
    about = "Superimpose a landslide at true scale on imagery of another place"
)]
pub struct Cli {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Landslide raster (GeoTIFF)
    #[arg(long)]
    pub landslide: Option<PathBuf>,

    /// Background imagery (GeoTIFF)
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Elevation model for hillshading (GeoTIFF)
    #[arg(long)]
    pub dem: Option<PathBuf>,

    /// Landslide outline (.kml, .shp, .geojson)
    #[arg(long)]
    pub outline: Option<PathBuf>,

    /// Landslide crown as LAT,LON
    #[arg(long, value_parser = parse_latlon, allow_hyphen_values = true)]
    pub crown: Option<LatLon>,

    /// Where the crown should land, as LAT,LON
    #[arg(long, value_parser = parse_latlon, allow_hyphen_values = true)]
    pub target: Option<LatLon>,

    /// Counter-clockwise rotation about the crown, in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    pub rotation: Option<f64>,

    /// Margin kept around the outline when clipping, in metres
    #[arg(long)]
    pub clip_padding: Option<f64>,

    /// Keep the whole clip window instead of masking to the outline
    #[arg(long)]
    pub no_mask: bool,

    /// Map extent to draw
    #[arg(long, value_enum)]
    pub frame: Option<Frame>,

    /// Margin around the landslide for --frame landslide, in metres
    #[arg(long)]
    pub padding: Option<f64>,

    /// Output size (longest side in pixels)
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Output image path [default: landslide_overlay.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for outline preview images
    #[arg(long)]
    pub previews: Option<PathBuf>,

    /// Export the placed landslide as a GeoTIFF
    #[arg(long)]
    pub export_geotiff: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            landslide: self.landslide.clone(),
            background: self.background.clone(),
            dem: self.dem.clone(),
            outline: self.outline.clone(),
            crown: self.crown,
            target: self.target,
            rotation_deg: self.rotation,
            clip_padding_m: self.clip_padding,
            no_mask: self.no_mask,
            frame: self.frame,
            padding_m: self.padding,
            size: self.size,
            output: self.output.clone(),
            previews: self.previews.clone(),
            placed_geotiff: self.export_geotiff.clone(),
        }
    }

    /// The configuration file with flags applied, or flags alone
    pub fn to_config(&self) -> Result<Config> {
        let overrides = self.overrides();
        match &self.config {
            Some(path) => {
                let mut config = Config::load(path)?;
                config.apply_overrides(&overrides);
                Ok(config)
            }
            None => Config::from_overrides(&overrides),
        }
    }
}

fn parse_latlon(s: &str) -> std::result::Result<LatLon, String> {
    s.parse()
}
