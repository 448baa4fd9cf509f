use tracing::debug;

use crate::crs::{self, Crs};
use crate::error::{OverlayError, Result};
use crate::raster::{envelope, GeoTransform, Raster};
use crate::resample::Resampling;

/// Points sampled along each edge of the source footprint
const EDGE_SAMPLES: usize = 21;

/// Upper bound on either side of a reprojected grid
const MAX_DIMENSION: usize = 30_000;

/// Warp a raster into `target`.
///
/// The output is north-up with square pixels matching the source ground
/// resolution, spanning the densified source footprint. Each output
/// cell centre is mapped back into the source and sampled; cells that
/// fall outside the source are NaN.
pub fn reproject(raster: &Raster, target: Crs, method: Resampling) -> Result<Raster> {
    let source = raster.crs();
    if source == target {
        return Ok(raster.clone());
    }

    let footprint = footprint(raster, target);
    let (min_x, min_y, max_x, max_y) = envelope(&footprint);
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return Err(OverlayError::UnsupportedCrs(format!(
            "cannot reproject {} footprint into {}",
            source, target
        )));
    }

    let resolution = match target {
        Crs::Geographic => {
            let (px, py) = raster.transform().pixel_size();
            if source.is_metric() {
                let (_, lat) = raster.centre_lonlat();
                let deg_x = px / (111_320.0 * lat.to_radians().cos());
                let deg_y = py / 110_540.0;
                (deg_x + deg_y) / 2.0
            } else {
                (px + py) / 2.0
            }
        }
        Crs::Utm { .. } => raster.ground_resolution(),
    };
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(OverlayError::invalid(
            "resolution",
            resolution,
            "source raster has no usable pixel size",
        ));
    }

    let cols = ((max_x - min_x) / resolution).ceil().max(1.0) as usize;
    let rows = ((max_y - min_y) / resolution).ceil().max(1.0) as usize;
    if cols > MAX_DIMENSION || rows > MAX_DIMENSION {
        return Err(OverlayError::invalid(
            "reprojected size",
            format!("{}x{}", cols, rows),
            format!("exceeds {} pixels per side", MAX_DIMENSION),
        ));
    }

    let transform = GeoTransform::new(min_x, max_y, resolution, -resolution);
    let mut output = Raster::empty(raster.band_count(), rows, cols, transform, target)?;

    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = transform.pixel_to_geo(col, row);
            let (sx, sy) = crs::transform(target, source, x, y);
            let idx = row * cols + col;
            for band in 0..raster.band_count() {
                output.band_mut(band)[idx] = raster.sample(band, sx, sy, method);
            }
        }
    }

    debug!(
        from = %source,
        to = %target,
        cols,
        rows,
        resolution,
        "reprojected raster"
    );
    Ok(output)
}

/// Source outline sampled along its edges and projected into `target`
fn footprint(raster: &Raster, target: Crs) -> Vec<(f64, f64)> {
    let gt = raster.transform();
    let (cols, rows) = (raster.cols() as f64, raster.rows() as f64);
    let source = raster.crs();

    let mut points = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        for (col, row) in [(t * cols, 0.0), (t * cols, rows), (0.0, t * rows), (cols, t * rows)] {
            let (x, y) = gt.apply(col, row);
            points.push(crs::transform(source, target, x, y));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(transform: GeoTransform, crs: Crs, rows: usize, cols: usize) -> Raster {
        let data = (0..rows * cols).map(|i| (i % cols) as f64).collect();
        Raster::new(vec![data], rows, cols, transform, crs).unwrap()
    }

    #[test]
    fn test_same_crs_is_noop() {
        let crs = Crs::Utm { zone: 5, north: true };
        let raster = gradient(GeoTransform::new(500_000.0, 6_650_000.0, 10.0, -10.0), crs, 4, 4);
        let out = reproject(&raster, crs, Resampling::Cubic).unwrap();
        assert_eq!(out.band(0), raster.band(0));
        assert_eq!(out.transform(), raster.transform());
    }

    #[test]
    fn test_geographic_to_utm() {
        // ~1.1 km x 1.1 km block at 60N, 0.0002 deg lon x 0.0001 deg lat cells
        let gt = GeoTransform::new(-153.09, 60.03, 0.0002, -0.0001);
        let raster = gradient(gt, Crs::Geographic, 100, 50);
        let target = Crs::Utm { zone: 5, north: true };
        let out = reproject(&raster, target, Resampling::Bilinear).unwrap();

        assert_eq!(out.crs(), target);
        assert!(out.transform().is_north_up());
        let res = out.transform().pixel_width;
        assert!(res > 10.0 && res < 12.0, "resolution {res}");

        // Sampling through the output at a known location agrees with the source
        let (lon, lat) = (-153.085, 60.025);
        let (x, y) = target.from_lonlat(lon, lat);
        let expected = raster.sample(0, lon, lat, Resampling::Bilinear);
        let got = out.sample(0, x, y, Resampling::Nearest);
        assert!((got - expected).abs() < 1.0, "got {got}, expected {expected}");
    }

    #[test]
    fn test_cross_zone_leaves_nan_corners() {
        let z5 = Crs::Utm { zone: 5, north: true };
        let z6 = Crs::Utm { zone: 6, north: true };
        let (x, y) = z5.from_lonlat(-150.5, 62.0);
        let raster = gradient(GeoTransform::new(x, y, 30.0, -30.0), z5, 40, 40);
        let out = reproject(&raster, z6, Resampling::Nearest).unwrap();

        // Grid convergence rotates the footprint, so the envelope has empty corners
        assert!(out.get(0, 0, 0).unwrap().is_nan());
        assert!(out.valid_count(0) > 0);
        assert!(out.valid_count(0) < out.rows() * out.cols());
    }
}
