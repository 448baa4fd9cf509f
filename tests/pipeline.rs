use std::path::{Path, PathBuf};

use landslide_overlay::config::{Config, InputsConfig, OutputConfig, PlacementConfig};
use landslide_overlay::{
    read_geotiff, run, write_geotiff, ClipOptions, Crs, Frame, GeoTransform, LatLon, Raster,
    RenderOptions,
};

const CROWN: LatLon = LatLon { lat: 60.0319, lon: -153.0906 };
const TARGET: LatLon = LatLon { lat: 64.8378, lon: -147.7164 };
const ZONE_5: Crs = Crs::Utm { zone: 5, north: true };
const ZONE_6: Crs = Crs::Utm { zone: 6, north: true };

/// Square grid of 10 m cells centred on `centre`
fn grid(centre: LatLon, crs: Crs, size: usize, value: impl Fn(usize, usize) -> f64) -> Raster {
    let (x, y) = centre.project(crs);
    let half = size as f64 * 10.0 / 2.0;
    let data = (0..size * size).map(|i| value(i / size, i % size)).collect();
    let transform = GeoTransform::new(x - half, y + half, 10.0, -10.0);
    Raster::new(vec![data], size, size, transform, crs).unwrap()
}

/// KML square roughly 200 m across around the crown
fn write_outline(dir: &Path) -> PathBuf {
    let (dlat, dlon) = (0.0009, 0.0018);
    let (lat, lon) = (CROWN.lat, CROWN.lon);
    let coords = [
        (lon - dlon, lat - dlat),
        (lon + dlon, lat - dlat),
        (lon + dlon, lat + dlat),
        (lon - dlon, lat + dlat),
        (lon - dlon, lat - dlat),
    ]
    .iter()
    .map(|(x, y)| format!("{},{},0", x, y))
    .collect::<Vec<_>>()
    .join(" ");

    let kml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>scarp</name>
      <Polygon>
        <outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>"#,
        coords
    );
    let path = dir.join("outline.kml");
    std::fs::write(&path, kml).unwrap();
    path
}

fn base_config(dir: &Path) -> Config {
    let landslide = dir.join("landslide.tif");
    write_geotiff(&grid(CROWN, ZONE_5, 40, |_, _| 500.5), &landslide).unwrap();

    Config {
        inputs: InputsConfig {
            landslide,
            background: None,
            dem: None,
            outline: write_outline(dir),
        },
        placement: PlacementConfig {
            crown: CROWN,
            target: TARGET,
            rotation_deg: 0.0,
        },
        clip: ClipOptions::default(),
        render: RenderOptions {
            size: 200,
            ..Default::default()
        },
        output: OutputConfig {
            image: Some(dir.join("overlay.png")),
            previews: None,
            placed_geotiff: None,
        },
    }
}

#[test]
fn overlay_on_background_imagery() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());

    let background = dir.path().join("background.tif");
    write_geotiff(&grid(TARGET, ZONE_6, 100, |_, c| c as f64 * 0.01 + 0.005), &background).unwrap();
    config.inputs.background = Some(background);
    config.output.previews = Some(dir.path().join("previews"));
    config.output.placed_geotiff = Some(dir.path().join("placed.tif"));

    let summary = run(&config).unwrap();
    assert_eq!(summary.landslide_crs, ZONE_5);
    assert_eq!(summary.frame_crs, ZONE_6);
    assert_eq!(summary.dimensions, (200, 200));
    assert_eq!(summary.written.len(), 4);
    assert!(summary.clipped_cells > 300);
    assert!(summary.scale_bar_m.is_some());

    let img = image::open(&summary.image).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (200, 200));
    // Target marker at the centre of the background
    assert_eq!(img.get_pixel(100, 100).0, [214, 39, 40]);
    // Constant landslide inside its outline, background gradient outside
    assert_eq!(img.get_pixel(88, 88).0, [0, 0, 0]);
    assert_ne!(img.get_pixel(20, 88).0, [0, 0, 0]);

    for name in ["landslide_outline.png", "landslide_clipped.png"] {
        assert!(dir.path().join("previews").join(name).exists());
    }

    // The exported landslide sits over the target in the frame CRS
    let placed = read_geotiff(dir.path().join("placed.tif")).unwrap();
    assert_eq!(placed.crs(), ZONE_6);
    let (tx, ty) = TARGET.project(ZONE_6);
    let (min_x, min_y, max_x, max_y) = placed.bounds();
    assert!(min_x < tx && tx < max_x);
    assert!(min_y < ty && ty < max_y);
    assert!((summary.target_xy.0 - tx).abs() < 1e-6);
}

#[test]
fn overlay_on_hillshade_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());

    let dem = dir.path().join("dem.tif");
    write_geotiff(&grid(TARGET, ZONE_6, 100, |r, c| (r + 2 * c) as f64 * 3.0), &dem).unwrap();
    config.inputs.dem = Some(dem);
    config.render.frame = Frame::Landslide;
    config.render.padding_m = 100.0;
    config.placement.rotation_deg = 45.0;

    let summary = run(&config).unwrap();
    assert_eq!(summary.frame_crs, ZONE_6);
    assert_eq!(summary.rotation_deg, 45.0);
    assert_eq!(summary.dimensions.0.max(summary.dimensions.1), 200);
    assert_eq!(summary.written, vec![dir.path().join("overlay.png")]);
}

#[test]
fn missing_background_and_dem_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path());
    assert!(run(&config).is_err());
    assert!(!dir.path().join("overlay.png").exists());
}
