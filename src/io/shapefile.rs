//! ESRI shapefile polygon outlines.
//!
//! Only the main `.shp` file is needed; the CRS comes from the sibling
//! `.prj` when present. Rings follow the shapefile convention: clockwise
//! rings are exteriors, counter-clockwise rings are holes of the
//! preceding exterior.

use std::fs;
use std::path::Path;

use geo::{LineString, Polygon};
use tracing::warn;

use crate::crs::Crs;
use crate::error::{OverlayError, Result};
use crate::outline::Outline;

const FILE_CODE: i32 = 9994;
const HEADER_LEN: usize = 100;

const SHAPE_NULL: i32 = 0;
const SHAPE_POLYGON: i32 = 5;
const SHAPE_POLYGON_Z: i32 = 15;
const SHAPE_POLYGON_M: i32 = 25;

pub fn read_shapefile<P: AsRef<Path>>(path: P) -> Result<Outline> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    let prj_path = path.with_extension("prj");
    let crs = if prj_path.exists() {
        crs_from_prj(&fs::read_to_string(&prj_path)?)?
    } else {
        warn!(path = %path.display(), "no .prj next to shapefile, assuming EPSG:4326");
        Crs::Geographic
    };

    Outline::new(parse_shp(&bytes)?, crs)
}

fn truncated() -> OverlayError {
    OverlayError::UnsupportedData("truncated shapefile".to_string())
}

fn be_i32(bytes: &[u8], offset: usize) -> Result<i32> {
    let raw = bytes.get(offset..offset + 4).ok_or_else(truncated)?;
    Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn le_i32(bytes: &[u8], offset: usize) -> Result<i32> {
    let raw = bytes.get(offset..offset + 4).ok_or_else(truncated)?;
    Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Big-endian length in 16-bit words, as bytes; negative lengths are malformed
fn be_word_len(bytes: &[u8], offset: usize) -> Result<usize> {
    let words = be_i32(bytes, offset)?;
    usize::try_from(words)
        .ok()
        .and_then(|w| w.checked_mul(2))
        .ok_or_else(|| OverlayError::UnsupportedData(format!("invalid shapefile length {}", words)))
}

fn le_f64(bytes: &[u8], offset: usize) -> Result<f64> {
    let raw = bytes.get(offset..offset + 8).ok_or_else(truncated)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(f64::from_le_bytes(buf))
}

/// Parse the polygon records of a `.shp` file
pub fn parse_shp(bytes: &[u8]) -> Result<Vec<Polygon<f64>>> {
    if be_i32(bytes, 0)? != FILE_CODE {
        return Err(OverlayError::UnsupportedData(
            "not an ESRI shapefile".to_string(),
        ));
    }
    let file_len = be_word_len(bytes, 24)?.min(bytes.len());
    let shape_type = le_i32(bytes, 32)?;
    if !matches!(shape_type, SHAPE_POLYGON | SHAPE_POLYGON_Z | SHAPE_POLYGON_M) {
        return Err(OverlayError::UnsupportedData(format!(
            "shapefile shape type {} is not a polygon type",
            shape_type
        )));
    }

    let mut polygons = Vec::new();
    let mut offset = HEADER_LEN;
    while offset + 8 <= file_len {
        // Content length is counted in 16-bit words
        let content_len = be_word_len(bytes, offset + 4)?;
        let content = offset + 8;
        let record_type = le_i32(bytes, content)?;

        if record_type != SHAPE_NULL {
            polygons.extend(parse_polygon_record(bytes, content)?);
        }
        offset = content.checked_add(content_len).ok_or_else(truncated)?;
    }

    Ok(polygons)
}

fn parse_polygon_record(bytes: &[u8], content: usize) -> Result<Vec<Polygon<f64>>> {
    // type (4) + bbox (32)
    let num_parts = le_i32(bytes, content + 36)?.max(0) as usize;
    let num_points = le_i32(bytes, content + 40)?.max(0) as usize;
    let parts_at = content + 44;
    let points_at = num_parts
        .checked_mul(4)
        .and_then(|len| parts_at.checked_add(len))
        .ok_or_else(truncated)?;

    let mut starts = Vec::new();
    for i in 0..num_parts {
        starts.push(le_i32(bytes, parts_at + i * 4)?.max(0) as usize);
    }

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(num_points).min(num_points);
        let mut ring = Vec::new();
        for p in start..end {
            let at = p
                .checked_mul(16)
                .and_then(|len| points_at.checked_add(len))
                .ok_or_else(truncated)?;
            ring.push((le_f64(bytes, at)?, le_f64(bytes, at + 8)?));
        }

        let is_hole = signed_area(&ring) > 0.0;
        let ring = LineString::from(ring);
        match polygons.last_mut() {
            Some(polygon) if is_hole => polygon.interiors_push(ring),
            _ => polygons.push(Polygon::new(ring, vec![])),
        }
    }

    Ok(polygons)
}

/// Shoelace area; positive for counter-clockwise rings
fn signed_area(ring: &[(f64, f64)]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % ring.len()];
        sum += x0 * y1 - x1 * y0;
    }
    sum / 2.0
}

/// Recognise geographic WGS84 and WGS84 UTM zones in a `.prj` WKT string
pub fn crs_from_prj(wkt: &str) -> Result<Crs> {
    let upper = wkt.to_ascii_uppercase();
    if !upper.contains("PROJCS") && !upper.contains("PROJCRS") {
        return Ok(Crs::Geographic);
    }

    // Only WGS84-based UTM zones map onto EPSG:326xx / 327xx
    let wgs84 = upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84");
    if let Some(idx) = upper.find("UTM").filter(|_| wgs84) {
        let rest = &upper[idx..];
        if let Some(zone_idx) = rest.find("ZONE") {
            let tail = rest[zone_idx + 4..].trim_start_matches(|c: char| c == '_' || c == ' ');
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            let hemisphere = tail[digits.len()..].chars().next();
            if let (Ok(zone), Some(h)) = (digits.parse::<u32>(), hemisphere) {
                if (1..=60).contains(&zone) && (h == 'N' || h == 'S') {
                    return Ok(Crs::Utm {
                        zone,
                        north: h == 'N',
                    });
                }
            }
        }
    }

    let head: String = wkt.chars().take(60).collect();
    Err(OverlayError::UnsupportedCrs(format!("projection in .prj: {}", head)))
}
