//! GeoJSON polygon outlines (RFC 7946, always WGS84)

use std::fs;
use std::path::Path;

use geo::{LineString, Polygon};
use serde_json::Value;

use crate::crs::Crs;
use crate::error::{OverlayError, Result};
use crate::outline::Outline;

pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<Outline> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

pub fn parse_geojson(text: &str) -> Result<Outline> {
    let value: Value = serde_json::from_str(text)?;
    let mut polygons = Vec::new();
    collect_polygons(&value, &mut polygons)?;
    Outline::new(polygons, Crs::Geographic)
}

fn collect_polygons(value: &Value, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            if let Some(features) = value.get("features").and_then(Value::as_array) {
                for feature in features {
                    collect_polygons(feature, out)?;
                }
            }
        }
        Some("Feature") => {
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_polygons(geometry, out)?;
            }
        }
        Some("GeometryCollection") => {
            if let Some(geometries) = value.get("geometries").and_then(Value::as_array) {
                for geometry in geometries {
                    collect_polygons(geometry, out)?;
                }
            }
        }
        Some("Polygon") => out.push(parse_polygon(coordinates(value)?)?),
        Some("MultiPolygon") => {
            for polygon in as_array(coordinates(value)?)? {
                out.push(parse_polygon(polygon)?);
            }
        }
        _ => {}
    }
    Ok(())
}

fn coordinates(value: &Value) -> Result<&Value> {
    value
        .get("coordinates")
        .ok_or_else(|| OverlayError::UnsupportedData("geometry without coordinates".to_string()))
}

fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| OverlayError::UnsupportedData(format!("expected array, got {}", value)))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    as_array(value)?
        .iter()
        .map(|position| {
            let pos = as_array(position)?;
            match (pos.first().and_then(Value::as_f64), pos.get(1).and_then(Value::as_f64)) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(OverlayError::UnsupportedData(format!(
                    "invalid position {}",
                    position
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = as_array(value)?.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| OverlayError::UnsupportedData("polygon without rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-153.08, 60.02], [-153.07, 60.02], [-153.07, 60.03], [-153.08, 60.02]]]
                }},
                {"type": "Feature", "properties": {}, "geometry": null},
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                        [[[2, 0], [3, 0], [3, 1], [2, 0]]]
                    ]
                }}
            ]
        }"#;
        let outline = parse_geojson(text).unwrap();
        assert_eq!(outline.polygons().0.len(), 3);
        assert_eq!(outline.crs(), Crs::Geographic);
    }

    #[test]
    fn test_point_only_is_error() {
        let text = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(parse_geojson(text).is_err());
    }

    #[test]
    fn test_bad_position_is_error() {
        let text = r#"{"type": "Polygon", "coordinates": [[[1.0], [2.0, 3.0], [4.0, 5.0], [1.0, 2.0]]]}"#;
        assert!(matches!(
            parse_geojson(text),
            Err(OverlayError::UnsupportedData(_))
        ));
    }
}
