//! Georeferenced multi-band rasters

use crate::crs::Crs;
use crate::error::{OverlayError, Result};
use crate::geometry::Placement;
use crate::resample::{sample_grid, Resampling};

/// Affine transformation from pixel (col, row) to map (x, y) coordinates:
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
/// North-up rasters have zero rotation terms and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Map coordinates of a fractional pixel position (corner convention)
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinates of a pixel centre
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position of a map coordinate (corner convention)
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (col, row)
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-12 && self.col_rotation.abs() < 1e-12 && self.pixel_height < 0.0
    }

    /// Ground size of one pixel along columns and rows
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.col_rotation),
            self.pixel_height.hypot(self.row_rotation),
        )
    }

    /// Envelope `(min_x, min_y, max_x, max_y)` of a `cols` x `rows` grid
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(cols as f64, 0.0),
            self.apply(0.0, rows as f64),
            self.apply(cols as f64, rows as f64),
        ];
        envelope(&corners)
    }

    /// Compose with a rigid placement so the grid lands where the placement puts it
    pub fn placed(&self, placement: &Placement) -> Self {
        let m = placement.matrix();
        let (a, b, c, d) = (m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]);
        let (origin_x, origin_y) = placement.apply(self.origin_x, self.origin_y);

        Self {
            origin_x,
            origin_y,
            pixel_width: a * self.pixel_width + b * self.col_rotation,
            row_rotation: a * self.row_rotation + b * self.pixel_height,
            col_rotation: c * self.pixel_width + d * self.col_rotation,
            pixel_height: c * self.row_rotation + d * self.pixel_height,
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Envelope of a set of points
pub fn envelope(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(min_x, min_y, max_x, max_y), &(x, y)| {
            (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
        },
    )
}

/// A raster with one or more `f64` bands in row-major order; NaN marks nodata
#[derive(Debug, Clone)]
pub struct Raster {
    bands: Vec<Vec<f64>>,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    crs: Crs,
}

impl Raster {
    pub fn new(
        bands: Vec<Vec<f64>>,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 || bands.is_empty() {
            return Err(OverlayError::invalid(
                "raster",
                format!("{}x{}x{}", cols, rows, bands.len()),
                "raster must have at least one band and one cell",
            ));
        }
        if let Some(band) = bands.iter().find(|b| b.len() != rows * cols) {
            return Err(OverlayError::invalid(
                "raster",
                band.len(),
                format!("band length does not match {}x{}", cols, rows),
            ));
        }

        Ok(Self {
            bands,
            rows,
            cols,
            transform,
            crs,
        })
    }

    /// A raster of the same shape filled with NaN
    pub fn empty(band_count: usize, rows: usize, cols: usize, transform: GeoTransform, crs: Crs) -> Result<Self> {
        Self::new(vec![vec![f64::NAN; rows * cols]; band_count], rows, cols, transform, crs)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> &[f64] {
        &self.bands[index]
    }

    pub fn band_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.bands[index]
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn set_crs(&mut self, crs: Crs) {
        self.crs = crs;
    }

    pub fn get(&self, band: usize, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.bands.get(band).map(|b| b[row * self.cols + col])
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// Sample `band` at map coordinate `(x, y)`; NaN outside the grid
    pub fn sample(&self, band: usize, x: f64, y: f64, method: Resampling) -> f64 {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        sample_grid(&self.bands[band], self.cols, self.rows, col - 0.5, row - 0.5, method)
    }

    /// Sample every band at once; `None` when any band is nodata there
    pub fn sample_all(&self, x: f64, y: f64, method: Resampling) -> Option<Vec<f64>> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        self.bands
            .iter()
            .map(|b| {
                let v = sample_grid(b, self.cols, self.rows, col - 0.5, row - 0.5, method);
                v.is_finite().then_some(v)
            })
            .collect()
    }

    /// Longitude/latitude of the raster centre
    pub fn centre_lonlat(&self) -> (f64, f64) {
        let (x, y) = self
            .transform
            .apply(self.cols as f64 / 2.0, self.rows as f64 / 2.0);
        self.crs.to_lonlat(x, y)
    }

    /// Approximate ground resolution in metres (mean of both axes)
    pub fn ground_resolution(&self) -> f64 {
        let (px, py) = self.transform.pixel_size();
        match self.crs {
            Crs::Utm { .. } => (px + py) / 2.0,
            Crs::Geographic => {
                let (_, lat) = self.centre_lonlat();
                let metres_x = px * 111_320.0 * lat.to_radians().cos();
                let metres_y = py * 110_540.0;
                (metres_x + metres_y) / 2.0
            }
        }
    }

    pub fn valid_count(&self, band: usize) -> usize {
        self.bands[band].iter().filter(|v| v.is_finite()).count()
    }
}

/// Linear contrast stretch from data values to 0..=255
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stretch {
    pub low: f64,
    pub high: f64,
}

impl Stretch {
    pub const IDENTITY: Stretch = Stretch {
        low: 0.0,
        high: 255.0,
    };

    /// Percentile stretch over the finite values of `data`.
    ///
    /// Large bands are subsampled with a fixed stride before sorting.
    pub fn percentile(data: &[f64], low_pct: f64, high_pct: f64) -> Self {
        const MAX_SAMPLES: usize = 250_000;
        let stride = (data.len() / MAX_SAMPLES).max(1);
        let mut values: Vec<f64> = data
            .iter()
            .step_by(stride)
            .copied()
            .filter(|v| v.is_finite())
            .collect();

        if values.is_empty() {
            return Self::IDENTITY;
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let pick = |pct: f64| {
            let idx = ((pct / 100.0) * (values.len() - 1) as f64).round() as usize;
            values[idx.min(values.len() - 1)]
        };
        let low = pick(low_pct);
        let mut high = pick(high_pct);
        if high - low < f64::EPSILON {
            high = low + 1.0;
        }

        Self { low, high }
    }

    /// Full data range of the finite values of `data`
    pub fn min_max(data: &[f64]) -> Self {
        let (low, high) = data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !low.is_finite() {
            return Self::IDENTITY;
        }
        if high - low < f64::EPSILON {
            return Self { low, high: low + 1.0 };
        }
        Self { low, high }
    }

    /// Identity for 8-bit imagery, 2-98 % percentile stretch otherwise
    pub fn for_band(data: &[f64]) -> Self {
        let is_byte = data
            .iter()
            .filter(|v| v.is_finite())
            .all(|&v| (0.0..=255.0).contains(&v) && v.fract() == 0.0);
        if is_byte && data.iter().any(|v| v.is_finite()) {
            Self::IDENTITY
        } else {
            Self::percentile(data, 2.0, 98.0)
        }
    }

    /// Normalised value in 0..=1
    pub fn unit(&self, value: f64) -> f64 {
        ((value - self.low) / (self.high - self.low)).clamp(0.0, 1.0)
    }

    pub fn apply(&self, value: f64) -> u8 {
        (self.unit(value) * 255.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn utm5() -> Crs {
        Crs::Utm { zone: 5, north: true }
    }

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);
        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        assert_eq!(gt.bounds(100, 100), (0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_placed_transform_translates() {
        let gt = GeoTransform::new(1000.0, 2000.0, 2.0, -2.0);
        let placement = Placement::new((1000.0, 2000.0), (5000.0, 7000.0), 0.0);
        let placed = gt.placed(&placement);
        assert_relative_eq!(placed.origin_x, 5000.0);
        assert_relative_eq!(placed.origin_y, 7000.0);
        assert_relative_eq!(placed.pixel_width, 2.0);
        assert_relative_eq!(placed.pixel_height, -2.0);
    }

    #[test]
    fn test_placed_transform_rotates_cells() {
        let gt = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let placement = Placement::new((0.0, 0.0), (0.0, 0.0), 90.0);
        let placed = gt.placed(&placement);
        // A step along the row direction now points north
        let (x, y) = placed.apply(1.0, 0.0);
        assert_relative_eq!(x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(y, 1.0, epsilon = 1e-12);
        assert!(!placed.is_north_up());
    }

    #[test]
    fn test_raster_rejects_bad_shape() {
        let gt = GeoTransform::default();
        assert!(Raster::new(vec![vec![0.0; 5]], 2, 3, gt, utm5()).is_err());
        assert!(Raster::new(vec![], 2, 3, gt, utm5()).is_err());
    }

    #[test]
    fn test_sample_centre_and_outside() {
        let gt = GeoTransform::new(0.0, 20.0, 10.0, -10.0);
        let raster = Raster::new(vec![vec![1.0, 2.0, 3.0, 4.0]], 2, 2, gt, utm5()).unwrap();
        assert_eq!(raster.sample(0, 15.0, 5.0, Resampling::Nearest), 4.0);
        assert_eq!(raster.sample(0, 5.0, 15.0, Resampling::Cubic), 1.0);
        assert!(raster.sample(0, 25.0, 5.0, Resampling::Nearest).is_nan());
        assert_eq!(raster.sample_all(15.0, 15.0, Resampling::Nearest), Some(vec![2.0]));
    }

    #[test]
    fn test_stretch_for_band() {
        let bytes = vec![0.0, 12.0, 255.0, f64::NAN];
        assert_eq!(Stretch::for_band(&bytes), Stretch::IDENTITY);

        let reflectance: Vec<f64> = (0..=100).map(|v| v as f64 / 100.0).collect();
        let stretch = Stretch::for_band(&reflectance);
        assert_relative_eq!(stretch.low, 0.02);
        assert_relative_eq!(stretch.high, 0.98);
        assert_eq!(stretch.apply(0.0), 0);
        assert_eq!(stretch.apply(1.0), 255);
    }

    #[test]
    fn test_stretch_min_max() {
        let dim = vec![12.0, 40.0, f64::NAN, 60.0];
        let stretch = Stretch::min_max(&dim);
        assert_eq!(stretch, Stretch { low: 12.0, high: 60.0 });
        assert_eq!(stretch.apply(12.0), 0);
        assert_eq!(stretch.apply(60.0), 255);

        assert_eq!(Stretch::min_max(&[f64::NAN]), Stretch::IDENTITY);
        assert_eq!(Stretch::min_max(&[5.0, 5.0]), Stretch { low: 5.0, high: 6.0 });
    }

    #[test]
    fn test_ground_resolution_geographic() {
        let gt = GeoTransform::new(-153.1, 60.1, 0.0001, -0.0001);
        let raster = Raster::empty(1, 10, 10, gt, Crs::Geographic).unwrap();
        let res = raster.ground_resolution();
        assert!(res > 8.0 && res < 9.0, "got {res}");
    }
}
