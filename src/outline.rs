//! Landslide outline polygons

use geo::{BoundingRect, Contains, Coord, LineString, MapCoords, MultiPolygon, Point, Polygon};

use crate::crs::{self, Crs};
use crate::error::{OverlayError, Result};
use crate::geometry::Placement;

/// One or more polygons together with the CRS of their vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    polygons: MultiPolygon<f64>,
    crs: Crs,
}

impl Outline {
    /// An outline must hold at least one polygon with a real exterior ring
    pub fn new(polygons: Vec<Polygon<f64>>, crs: Crs) -> Result<Self> {
        let polygons: Vec<Polygon<f64>> = polygons
            .into_iter()
            .filter(|p| p.exterior().0.len() >= 4)
            .collect();
        if polygons.is_empty() {
            return Err(OverlayError::UnsupportedData(
                "outline contains no polygons".to_string(),
            ));
        }

        Ok(Self {
            polygons: MultiPolygon::new(polygons),
            crs,
        })
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Reproject every vertex into `target`
    pub fn to_crs(&self, target: Crs) -> Outline {
        let from = self.crs;
        Outline {
            polygons: self.polygons.map_coords(|c| {
                let (x, y) = crs::transform(from, target, c.x, c.y);
                Coord { x, y }
            }),
            crs: target,
        }
    }

    /// Move the outline with a placement; the result lives in `target_crs`
    pub fn placed(&self, placement: &Placement, target_crs: Crs) -> Outline {
        Outline {
            polygons: self.polygons.map_coords(|c| {
                let (x, y) = placement.apply(c.x, c.y);
                Coord { x, y }
            }),
            crs: target_crs,
        }
    }

    /// Envelope `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.polygons.bounding_rect() {
            Some(rect) => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.contains(&Point::new(x, y))
    }

    /// Every ring (exteriors and holes), for drawing
    pub fn rings(&self) -> impl Iterator<Item = &LineString<f64>> {
        self.polygons
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
    }
}
