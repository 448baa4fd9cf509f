//! KML polygon outlines

use std::io::BufRead;
use std::path::Path;

use geo::{LineString, Polygon};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::crs::Crs;
use crate::error::{OverlayError, Result};
use crate::outline::Outline;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Boundary {
    Outer,
    Inner,
}

/// Read every `<Polygon>` of a KML document; coordinates are WGS84
pub fn read_kml<P: AsRef<Path>>(path: P) -> Result<Outline> {
    let reader = Reader::from_file(path.as_ref())?;
    parse_kml(reader)
}

pub fn parse_kml<R: BufRead>(mut reader: Reader<R>) -> Result<Outline> {
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut polygons = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut interiors = Vec::new();
    let mut in_polygon = false;
    let mut boundary = None;
    let mut in_coordinates = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"Polygon" => {
                    in_polygon = true;
                    exterior = None;
                    interiors.clear();
                }
                b"outerBoundaryIs" => boundary = Some(Boundary::Outer),
                b"innerBoundaryIs" => boundary = Some(Boundary::Inner),
                b"coordinates" if in_polygon && boundary.is_some() => {
                    in_coordinates = true;
                    text.clear();
                }
                _ => {}
            },
            Event::Text(e) if in_coordinates => text.push_str(&e.unescape()?),
            Event::CData(e) if in_coordinates => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"coordinates" if in_coordinates => {
                    in_coordinates = false;
                    let ring = parse_coordinates(&text)?;
                    match boundary {
                        Some(Boundary::Outer) => exterior = Some(ring),
                        Some(Boundary::Inner) => interiors.push(ring),
                        None => {}
                    }
                }
                b"outerBoundaryIs" | b"innerBoundaryIs" => boundary = None,
                b"Polygon" => {
                    in_polygon = false;
                    if let Some(ring) = exterior.take() {
                        polygons.push(Polygon::new(ring, std::mem::take(&mut interiors)));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Outline::new(polygons, Crs::Geographic)
}

/// Parse whitespace-separated `lon,lat[,alt]` tuples
fn parse_coordinates(text: &str) -> Result<LineString<f64>> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            let lat = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(OverlayError::UnsupportedData(format!(
                    "invalid KML coordinate tuple '{}'",
                    tuple
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>iliamna_2016</name>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>
              -153.08,60.02,0 -153.07,60.02,0 -153.07,60.03,0 -153.08,60.03,0 -153.08,60.02,0
            </coordinates>
          </LinearRing>
        </outerBoundaryIs>
        <innerBoundaryIs>
          <LinearRing>
            <coordinates>-153.076,60.024 -153.074,60.024 -153.074,60.026 -153.076,60.024</coordinates>
          </LinearRing>
        </innerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>"#;

    #[test]
    fn test_parse_polygon_with_hole() {
        let outline = parse_kml(Reader::from_str(KML)).unwrap();
        assert_eq!(outline.crs(), Crs::Geographic);
        assert_eq!(outline.polygons().0.len(), 1);
        assert_eq!(outline.polygons().0[0].interiors().len(), 1);

        let (min_x, min_y, max_x, max_y) = outline.bounds();
        assert_eq!((min_x, min_y, max_x, max_y), (-153.08, 60.02, -153.07, 60.03));
        assert!(outline.contains(-153.078, 60.028));
    }

    #[test]
    fn test_no_polygons_is_error() {
        let kml = "<kml><Document><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></Document></kml>";
        assert!(parse_kml(Reader::from_str(kml)).is_err());
    }

    #[test]
    fn test_bad_tuple_is_error() {
        let kml = "<kml><Polygon><outerBoundaryIs><LinearRing><coordinates>1,x 2,3 4,5</coordinates></LinearRing></outerBoundaryIs></Polygon></kml>";
        let err = parse_kml(Reader::from_str(kml)).unwrap_err();
        assert!(matches!(err, OverlayError::UnsupportedData(_)));
    }
}
