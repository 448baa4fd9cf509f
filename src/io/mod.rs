pub mod geojson;
pub mod geotiff;
pub mod kml;
pub mod shapefile;

use std::path::Path;

use tracing::debug;

use crate::error::{OverlayError, Result};
use crate::outline::Outline;

pub use geotiff::{read_geotiff, write_geotiff};

/// Read a landslide outline, choosing the format from the file extension
pub fn read_outline<P: AsRef<Path>>(path: P) -> Result<Outline> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let outline = match ext.as_str() {
        "kml" => kml::read_kml(path)?,
        "shp" => shapefile::read_shapefile(path)?,
        "geojson" | "json" => geojson::read_geojson(path)?,
        _ => {
            return Err(OverlayError::UnsupportedData(format!(
                "unknown outline format: {}",
                path.display()
            )))
        }
    };

    debug!(
        path = %path.display(),
        polygons = outline.polygons().0.len(),
        crs = %outline.crs(),
        "read outline"
    );
    Ok(outline)
}
