//! WGS84 geographic and UTM coordinate reference systems.
//!
//! Pure-Rust forward and inverse transverse Mercator (Snyder 1987, USGS
//! Prof. Paper 1395, pp. 61-64). Only the two families needed to put
//! imagery into a locally metric frame are supported: EPSG:4326 and the
//! WGS84 UTM zones EPSG:326xx / 327xx.

use std::fmt;

use crate::error::{OverlayError, Result};

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A coordinate reference system this tool can reason about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// WGS84 longitude/latitude in degrees (EPSG:4326)
    Geographic,
    /// WGS84 UTM zone, easting/northing in metres
    Utm { zone: u32, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Geographic),
            32601..=32660 => Some(Crs::Utm {
                zone: code - 32600,
                north: true,
            }),
            32701..=32760 => Some(Crs::Utm {
                zone: code - 32700,
                north: false,
            }),
            _ => None,
        }
    }

    pub fn try_from_epsg(code: u32) -> Result<Self> {
        Self::from_epsg(code).ok_or_else(|| OverlayError::UnsupportedCrs(format!("EPSG:{}", code)))
    }

    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Geographic => 4326,
            Crs::Utm { zone, north: true } => 32600 + zone,
            Crs::Utm { zone, north: false } => 32700 + zone,
        }
    }

    pub fn is_metric(&self) -> bool {
        matches!(self, Crs::Utm { .. })
    }

    /// Project a WGS84 longitude/latitude into this CRS
    pub fn from_lonlat(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Crs::Geographic => (lon, lat),
            Crs::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
        }
    }

    /// Unproject a coordinate of this CRS into WGS84 longitude/latitude
    pub fn to_lonlat(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Crs::Geographic => (x, y),
            Crs::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Transform a coordinate between two supported CRSs
pub fn transform(from: Crs, to: Crs, x: f64, y: f64) -> (f64, f64) {
    if from == to {
        return (x, y);
    }
    let (lon, lat) = from.to_lonlat(x, y);
    to.from_lonlat(lon, lat)
}

/// Pick the WGS84 UTM zone covering a longitude/latitude.
///
/// Plain 6° bands: zone boundaries follow the EPSG areas of use, without
/// the Norway/Svalbard grid-zone exceptions.
pub fn estimate_utm_crs(lon: f64, lat: f64) -> Crs {
    let lon = ((lon + 180.0).rem_euclid(360.0)) - 180.0;
    let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u32;
    Crs::Utm {
        zone,
        north: lat >= 0.0,
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// WGS84 (longitude, latitude) in degrees to UTM (easting, northing) in metres
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// UTM (easting, northing) in metres to WGS84 (longitude, latitude) in degrees
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude (Snyder eq. 3-26)
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from the equator to `lat` (radians), Snyder eq. 3-21
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_epsg_codes() {
        assert_eq!(Crs::from_epsg(4326), Some(Crs::Geographic));
        assert_eq!(
            Crs::from_epsg(32605),
            Some(Crs::Utm {
                zone: 5,
                north: true
            })
        );
        assert_eq!(
            Crs::from_epsg(32721),
            Some(Crs::Utm {
                zone: 21,
                north: false
            })
        );
        assert_eq!(Crs::from_epsg(3857), None);
        assert_eq!(Crs::from_epsg(32600), None);
        assert_eq!(Crs::Utm { zone: 6, north: true }.epsg(), 32606);
        assert_eq!(Crs::Geographic.to_string(), "EPSG:4326");
    }

    #[test]
    fn test_estimate_utm_zone() {
        // Iliamna volcano and Fairbanks, Alaska
        assert_eq!(
            estimate_utm_crs(-153.0749, 60.0277),
            Crs::Utm { zone: 5, north: true }
        );
        assert_eq!(
            estimate_utm_crs(-147.8489, 64.8595),
            Crs::Utm { zone: 6, north: true }
        );
        assert_eq!(
            estimate_utm_crs(-58.3816, -34.6037),
            Crs::Utm { zone: 21, north: false }
        );
        assert_eq!(estimate_utm_crs(180.0, 10.0), Crs::Utm { zone: 1, north: true });
    }

    // Reference values from PROJ: EPSG:4326 -> EPSG:32630
    #[test]
    fn test_madrid_forward() {
        let (e, n) = wgs84_to_utm(-3.7037, 40.4168, 30, true);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    #[test]
    fn test_buenos_aires_forward() {
        let (e, n) = wgs84_to_utm(-58.3816, -34.6037, 21, false);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn test_inverse_recovers_lonlat() {
        for &(lon, lat, zone, north) in &[
            (-153.0749, 60.0277, 5, true),
            (-147.8489, 64.8595, 6, true),
            (-58.3816, -34.6037, 21, false),
            (-3.0, 0.0, 30, true),
        ] {
            let (e, n) = wgs84_to_utm(lon, lat, zone, north);
            let (lon2, lat2) = utm_to_wgs84(e, n, zone, north);
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-6);
            assert_abs_diff_eq!(lat2, lat, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_transform_between_zones() {
        let z5 = Crs::Utm { zone: 5, north: true };
        let z6 = Crs::Utm { zone: 6, north: true };
        let (x5, y5) = z5.from_lonlat(-150.0, 62.0);
        let (x6, y6) = transform(z5, z6, x5, y5);
        let (lon, lat) = z6.to_lonlat(x6, y6);
        assert_abs_diff_eq!(lon, -150.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 62.0, epsilon = 1e-6);
    }
}
