use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OverlayError, Result};
use crate::outline::Outline;
use crate::raster::{GeoTransform, Raster};

/// How the landslide raster is cut down to its outline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipOptions {
    /// Extra margin around the outline's bounding box, in metres
    pub padding_m: f64,
    /// Blank out cells whose centre lies outside the outline
    pub mask: bool,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            padding_m: 0.0,
            mask: true,
        }
    }
}

/// Crop a raster to an outline's bounding box and mask everything outside it.
///
/// The outline must already be in the raster's CRS. A clip that keeps no
/// valid cell is an error.
pub fn clip_to_outline(raster: &Raster, outline: &Outline, options: &ClipOptions) -> Result<Raster> {
    if raster.crs() != outline.crs() {
        return Err(OverlayError::CrsMismatch(
            raster.crs().to_string(),
            outline.crs().to_string(),
        ));
    }

    let (min_x, min_y, max_x, max_y) = outline.bounds();
    let pad = options.padding_m.max(0.0);
    let (min_x, min_y, max_x, max_y) = (min_x - pad, min_y - pad, max_x + pad, max_y + pad);

    // Pixel window covering the padded box
    let gt = raster.transform();
    let corners = [
        gt.geo_to_pixel(min_x, min_y),
        gt.geo_to_pixel(max_x, min_y),
        gt.geo_to_pixel(min_x, max_y),
        gt.geo_to_pixel(max_x, max_y),
    ];
    let col0 = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
    let row0 = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
    let col1 = (corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max).ceil().max(0.0) as usize)
        .min(raster.cols());
    let row1 = (corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max).ceil().max(0.0) as usize)
        .min(raster.rows());

    if col0 >= col1 || row0 >= row1 {
        return Err(OverlayError::EmptyClip(format!(
            "raster {:?} does not overlap outline {:?}",
            raster.bounds(),
            outline.bounds()
        )));
    }

    let (cols, rows) = (col1 - col0, row1 - row0);
    let (origin_x, origin_y) = gt.apply(col0 as f64, row0 as f64);
    let transform = GeoTransform {
        origin_x,
        origin_y,
        ..*gt
    };

    let mut bands = vec![Vec::with_capacity(rows * cols); raster.band_count()];
    for row in row0..row1 {
        for col in col0..col1 {
            let keep = if options.mask {
                let (x, y) = gt.pixel_to_geo(col, row);
                outline.contains(x, y)
            } else {
                true
            };
            for (band, out) in bands.iter_mut().enumerate() {
                let value = raster.band(band)[row * raster.cols() + col];
                out.push(if keep { value } else { f64::NAN });
            }
        }
    }

    let clipped = Raster::new(bands, rows, cols, transform, raster.crs())?;
    let valid = clipped.valid_count(0);
    if valid == 0 {
        return Err(OverlayError::EmptyClip(format!(
            "{}x{} window has no data inside the outline",
            cols, rows
        )));
    }

    debug!(cols, rows, valid, "clipped raster to outline");
    Ok(clipped)
}
