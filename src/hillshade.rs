//! Shaded relief from an elevation raster

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::raster::Raster;

/// Illumination and blending parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HillshadeParams {
    /// Sun azimuth in degrees (0 = North, clockwise)
    pub azimuth: f64,
    /// Sun altitude in degrees above the horizon
    pub altitude: f64,
    /// Vertical exaggeration
    pub z_factor: f64,
    /// Weight of the shading when blended over imagery (0 = none, 1 = full)
    pub blend: f64,
}

impl Default for HillshadeParams {
    fn default() -> Self {
        Self {
            azimuth: 315.0,
            altitude: 45.0,
            z_factor: 1.0,
            blend: 0.5,
        }
    }
}

/// Hillshade of the first band of a metric DEM, in 0..=1.
///
/// Uses Horn's 3x3 gradients. Edge cells and cells touching nodata are NaN.
pub fn hillshade(dem: &Raster, params: &HillshadeParams) -> Result<Raster> {
    if !dem.crs().is_metric() {
        return Err(OverlayError::invalid(
            "dem",
            dem.crs(),
            "hillshade needs a metric (UTM) elevation grid",
        ));
    }

    let (rows, cols) = (dem.rows(), dem.cols());
    let (px, py) = dem.transform().pixel_size();
    let z = params.z_factor;

    let azimuth_rad = (360.0 - params.azimuth + 90.0).to_radians();
    let zenith_rad = (90.0 - params.altitude).to_radians();
    let (cos_zenith, sin_zenith) = (zenith_rad.cos(), zenith_rad.sin());

    let elev = dem.band(0);
    let at = |r: usize, c: usize| elev[r * cols + c] * z;

    let mut shade = vec![f64::NAN; rows * cols];
    for row in 1..rows.saturating_sub(1) {
        for col in 1..cols.saturating_sub(1) {
            let a = at(row - 1, col - 1);
            let b = at(row - 1, col);
            let c = at(row - 1, col + 1);
            let d = at(row, col - 1);
            let e = at(row, col);
            let f = at(row, col + 1);
            let g = at(row + 1, col - 1);
            let h = at(row + 1, col);
            let i = at(row + 1, col + 1);
            if [a, b, c, d, e, f, g, h, i].iter().any(|v| !v.is_finite()) {
                continue;
            }

            let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * px);
            let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * py);

            let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            let aspect_rad = if dz_dx.abs() < 1e-10 && dz_dy.abs() < 1e-10 {
                0.0
            } else {
                let aspect = dz_dy.atan2(-dz_dx);
                if aspect < 0.0 {
                    2.0 * PI + aspect
                } else {
                    aspect
                }
            };

            let value = cos_zenith * slope_rad.cos()
                + sin_zenith * slope_rad.sin() * (azimuth_rad - aspect_rad).cos();
            shade[row * cols + col] = value.clamp(0.0, 1.0);
        }
    }

    Raster::new(vec![shade], rows, cols, *dem.transform(), dem.crs())
}
