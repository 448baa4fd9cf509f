pub mod cli;
pub mod clip;
pub mod config;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod hillshade;
pub mod io;
pub mod outline;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod reproject;
pub mod resample;

pub use cli::Cli;
pub use clip::{clip_to_outline, ClipOptions};
pub use config::Config;
pub use crs::{estimate_utm_crs, Crs};
pub use error::{OverlayError, Result};
pub use geometry::{plan_placement, LatLon, Placement};
pub use hillshade::{hillshade, HillshadeParams};
pub use io::{read_geotiff, read_outline, write_geotiff};
pub use outline::Outline;
pub use pipeline::{run, Summary};
pub use raster::{GeoTransform, Raster};
pub use render::{Frame, RenderOptions};
pub use reproject::reproject;
pub use resample::{resize_to_fit, Resampling};
