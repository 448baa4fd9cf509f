use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix2, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::raster::envelope;

/// A WGS84 latitude/longitude pair in degrees, written `lat,lon`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Project into `crs`
    pub fn project(&self, crs: Crs) -> (f64, f64) {
        crs.from_lonlat(self.lon, self.lat)
    }
}

impl From<[f64; 2]> for LatLon {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<LatLon> for [f64; 2] {
    fn from(value: LatLon) -> Self {
        [value.lat, value.lon]
    }
}

impl FromStr for LatLon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(format!("Invalid coordinate format '{}', expected LAT,LON", s));
        }

        let lat: f64 = parts[0]
            .parse()
            .map_err(|_| format!("Invalid latitude value: {}", parts[0]))?;
        let lon: f64 = parts[1]
            .parse()
            .map_err(|_| format!("Invalid longitude value: {}", parts[1]))?;

        let coord = Self::new(lat, lon);
        if !coord.is_valid() {
            return Err(format!("Coordinate out of range: {}", s));
        }
        Ok(coord)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

/// Rigid planar transform moving the landslide crown onto the target.
///
/// The matrix is `T(target) * R(theta) * T(-crown)`: the crown is the
/// fixed point of the rotation, and rotation is counter-clockwise in map
/// coordinates (x east, y north).
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    crown: (f64, f64),
    target: (f64, f64),
    rotation_deg: f64,
    matrix: Matrix3<f64>,
}

impl Placement {
    pub fn new(crown: (f64, f64), target: (f64, f64), rotation_deg: f64) -> Self {
        let (cx, cy) = crown;
        let (tx, ty) = target;

        let translate_to_origin = Matrix3::new(
            1.0, 0.0, -cx,
            0.0, 1.0, -cy,
            0.0, 0.0, 1.0,
        );

        let theta = rotation_deg.to_radians();
        let rotation_2x2 = Matrix2::new(
            theta.cos(), -theta.sin(),
            theta.sin(), theta.cos(),
        );
        let rotation = Matrix3::new(
            rotation_2x2[(0, 0)], rotation_2x2[(0, 1)], 0.0,
            rotation_2x2[(1, 0)], rotation_2x2[(1, 1)], 0.0,
            0.0, 0.0, 1.0,
        );

        let translate_to_target = Matrix3::new(
            1.0, 0.0, tx,
            0.0, 1.0, ty,
            0.0, 0.0, 1.0,
        );

        Self {
            crown,
            target,
            rotation_deg,
            matrix: translate_to_target * rotation * translate_to_origin,
        }
    }

    pub fn crown(&self) -> (f64, f64) {
        self.crown
    }

    pub fn target(&self) -> (f64, f64) {
        self.target
    }

    pub fn rotation_deg(&self) -> f64 {
        self.rotation_deg
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Offset added to every coordinate when there is no rotation
    pub fn offset(&self) -> (f64, f64) {
        (self.target.0 - self.crown.0, self.target.1 - self.crown.1)
    }

    /// Landslide frame to background frame
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        transform_point(&self.matrix, x, y)
    }

    /// The placement mapping background frame back to landslide frame
    pub fn inverse(&self) -> Placement {
        Placement::new(self.target, self.crown, -self.rotation_deg)
    }

    /// Envelope of a landslide-frame box after placement
    pub fn transformed_bounds(&self, bounds: (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
        let (min_x, min_y, max_x, max_y) = bounds;
        let corners = [
            self.apply(min_x, min_y),
            self.apply(max_x, min_y),
            self.apply(min_x, max_y),
            self.apply(max_x, max_y),
        ];
        envelope(&corners)
    }
}

/// Project the crown into the landslide frame and the target into the
/// background frame, then build the placement between them.
///
/// The two UTM frames are treated as interchangeable metric planes, which
/// keeps distances and areas at true scale.
pub fn plan_placement(
    crown: LatLon,
    target: LatLon,
    landslide_crs: Crs,
    background_crs: Crs,
    rotation_deg: f64,
) -> Placement {
    Placement::new(
        crown.project(landslide_crs),
        target.project(background_crs),
        rotation_deg,
    )
}

/// Transform a point using an affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}
